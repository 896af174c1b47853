use std::{collections::HashSet, io::Write, path::PathBuf, sync::Arc};

use futures_util::future::join_all;
use time::OffsetDateTime;
use uuid::Uuid;

use code_analyst::analysis::{
    AnalysisFailure, AnalysisRecord, ClientInfo, FailureKind, MemoryRecordStore,
    NdjsonRecordStore, Operation, Outcome, RecordStore, open_record_store,
    store::{STORED_CODE_CHARS, TRUNCATION_MARKER},
};

fn temp_store_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("code-analyst-store-test-{}", Uuid::now_v7()))
        .join("nested")
        .join(name)
}

fn success_record(code: impl Into<String>) -> AnalysisRecord {
    AnalysisRecord::from_outcome(
        code.into(),
        Operation::Explain,
        &ClientInfo::new(Some("198.51.100.4".to_string()), None),
        &Outcome::Success {
            ai_response: "fine".to_string(),
            response_time_ms: 12,
        },
        OffsetDateTime::now_utc(),
    )
}

#[tokio::test]
async fn given_missing_parent_dir_when_opened_then_it_is_created() {
    let path = temp_store_path("records.ndjson");
    let store = NdjsonRecordStore::open(&path).await.expect("store opens");

    assert!(path.exists());
    assert_eq!(store.path(), path.as_path());
    let scan = store.read_all().await.expect("read");
    assert!(scan.records.is_empty());
    assert!(scan.skipped_lines.is_empty());

    let _ = std::fs::remove_dir_all(path.parent().and_then(|p| p.parent()).expect("root"));
}

#[tokio::test]
async fn given_records_when_saved_then_they_read_back_with_truncated_code() {
    let path = temp_store_path("records.ndjson");
    let store = NdjsonRecordStore::open(&path).await.expect("store opens");

    let long_code = "y".repeat(STORED_CODE_CHARS + 5_000);
    let first = success_record(long_code.clone());
    let failed = AnalysisRecord::from_outcome(
        "bad()".to_string(),
        Operation::Fix,
        &ClientInfo::default(),
        &Outcome::Failure {
            failure: AnalysisFailure::new(FailureKind::RateLimited),
            response_time_ms: 40,
        },
        OffsetDateTime::now_utc(),
    );

    let first_id = store.save(first.clone()).await.expect("first save");
    let failed_id = store.save(failed.clone()).await.expect("second save");
    assert_eq!(first_id, first.id);
    assert_eq!(failed_id, failed.id);

    let records = store.read_all().await.expect("read back").records;
    assert_eq!(records.len(), 2);

    assert_eq!(
        records[0].code,
        format!("{}{}", &long_code[..STORED_CODE_CHARS], TRUNCATION_MARKER)
    );
    assert_eq!(records[0].client_address, "198.51.100.4");
    assert_eq!(records[0].client_agent, "unknown");
    assert!(records[0].success);

    assert_eq!(records[1], failed);
    assert_eq!(
        records[1].error_message.as_deref(),
        Some(FailureKind::RateLimited.user_message())
    );

    let raw = std::fs::read_to_string(&path).expect("file readable");
    let first_line: serde_json::Value =
        serde_json::from_str(raw.lines().next().expect("first line")).expect("json line");
    assert_eq!(first_line["operation"], "explain");
    assert_eq!(first_line["aiResponse"], "fine");
    assert_eq!(first_line["responseTimeMs"], 12);
    assert_eq!(first_line["language"], "unknown");
    assert!(first_line["errorMessage"].is_null());

    // Records are write-once, so `timestamp` is the only time field.
    let mut keys = first_line
        .as_object()
        .expect("record is an object")
        .keys()
        .cloned()
        .collect::<Vec<_>>();
    keys.sort();
    assert_eq!(
        keys,
        [
            "aiResponse",
            "clientAddress",
            "clientAgent",
            "code",
            "errorMessage",
            "id",
            "language",
            "operation",
            "responseTimeMs",
            "success",
            "timestamp",
        ]
    );

    let _ = std::fs::remove_dir_all(path.parent().and_then(|p| p.parent()).expect("root"));
}

#[tokio::test]
async fn given_concurrent_saves_when_written_then_every_line_is_intact() {
    let path = temp_store_path("concurrent.ndjson");
    let store = Arc::new(NdjsonRecordStore::open(&path).await.expect("store opens"));

    let saves = (0..32).map(|index| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            store
                .save(success_record(format!("let v{index} = {index};")))
                .await
        })
    });
    let ids = join_all(saves)
        .await
        .into_iter()
        .map(|joined| joined.expect("task joins").expect("save succeeds"))
        .collect::<HashSet<_>>();
    assert_eq!(ids.len(), 32);

    let scan = store.read_all().await.expect("file readable");
    assert!(scan.skipped_lines.is_empty());
    let records = scan.records;
    assert_eq!(records.len(), 32);
    let stored_ids = records
        .into_iter()
        .map(|record| record.id)
        .collect::<HashSet<_>>();
    assert_eq!(stored_ids, ids);

    let _ = std::fs::remove_dir_all(path.parent().and_then(|p| p.parent()).expect("root"));
}

#[tokio::test]
async fn given_memory_store_when_saved_then_code_is_truncated_too() {
    let store = MemoryRecordStore::new();
    let code = "é".repeat(STORED_CODE_CHARS + 1);
    store.save(success_record(code)).await.expect("save");

    let records = store.records().await;
    let kept = records[0]
        .code
        .strip_suffix(TRUNCATION_MARKER)
        .expect("marker");
    assert_eq!(kept.chars().count(), STORED_CODE_CHARS);
}

#[tokio::test]
async fn given_store_urls_when_opened_then_supported_schemes_resolve() {
    let memory = open_record_store("memory://").await.expect("memory store");
    memory
        .save(success_record("x"))
        .await
        .expect("memory save");

    let path = temp_store_path("from-url.ndjson");
    let file = open_record_store(&format!("file://{}", path.display()))
        .await
        .expect("file store");
    file.save(success_record("y")).await.expect("file save");
    let raw = std::fs::read_to_string(&path).expect("file written");
    assert_eq!(raw.lines().count(), 1);

    assert!(open_record_store("file://").await.is_err());
    assert!(open_record_store("s3://bucket/records").await.is_err());

    let _ = std::fs::remove_dir_all(path.parent().and_then(|p| p.parent()).expect("root"));
}

#[tokio::test]
async fn given_torn_line_in_file_when_saving_and_reading_then_good_records_survive() {
    let path = temp_store_path("torn.ndjson");
    let store = NdjsonRecordStore::open(&path).await.expect("store opens");

    let before = success_record("before()");
    store.save(before.clone()).await.expect("first save");

    // Simulates a write that died halfway through a line.
    std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .expect("file opens for append")
        .write_all(br#"{"id":"0192","code":"par"#)
        .expect("fragment written");

    let after = success_record("after()");
    store.save(after.clone()).await.expect("save after fragment");

    let scan = store.read_all().await.expect("file readable");
    assert_eq!(scan.skipped_lines, vec![2]);
    let ids = scan
        .records
        .iter()
        .map(|record| record.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![before.id.as_str(), after.id.as_str()]);

    let _ = std::fs::remove_dir_all(path.parent().and_then(|p| p.parent()).expect("root"));
}
