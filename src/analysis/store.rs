use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::Mutex,
};

use crate::analysis::{
    error::StoreError,
    types::{AnalysisRecord, RecordId},
};

pub const STORED_CODE_CHARS: usize = 10_000;
pub const TRUNCATION_MARKER: &str = "... [truncated]";
pub const DEFAULT_STORE_URL: &str = "file://./state/code_analyses.ndjson";

/// Append-only sink for analysis records.
///
/// `save` must tolerate concurrent callers; each record is written
/// independently and never revisited.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save(&self, record: AnalysisRecord) -> Result<RecordId, StoreError>;
}

/// Caps `code` at [`STORED_CODE_CHARS`] and appends [`TRUNCATION_MARKER`].
pub fn truncate_for_storage(code: &str) -> String {
    match code.char_indices().nth(STORED_CODE_CHARS) {
        Some((cut, _)) => {
            let mut stored = String::with_capacity(cut + TRUNCATION_MARKER.len());
            stored.push_str(&code[..cut]);
            stored.push_str(TRUNCATION_MARKER);
            stored
        }
        None => code.to_string(),
    }
}

fn prepare_for_storage(mut record: AnalysisRecord) -> AnalysisRecord {
    record.code = truncate_for_storage(&record.code);
    record
}

/// Stores records as newline-delimited JSON in a single file.
pub struct NdjsonRecordStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl NdjsonRecordStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every parseable record. Lines that do not parse are skipped and
    /// reported by line number so one torn write never hides the rest.
    pub async fn read_all(&self) -> Result<RecordScan, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RecordScan::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut scan = RecordScan::default();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AnalysisRecord>(line) {
                Ok(record) => scan.records.push(record),
                Err(err) => {
                    tracing::warn!(
                        target: "analysis",
                        path = %self.path.display(),
                        line = index + 1,
                        error = %err,
                        "analysis_record_line_skipped"
                    );
                    scan.skipped_lines.push(index + 1);
                }
            }
        }
        Ok(scan)
    }
}

/// Result of reading an NDJSON record file.
#[derive(Debug, Default)]
pub struct RecordScan {
    pub records: Vec<AnalysisRecord>,
    /// 1-based line numbers that failed to parse.
    pub skipped_lines: Vec<usize>,
}

/// True when the file is non-empty and its last byte is not a newline.
async fn has_torn_tail(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

#[async_trait]
impl RecordStore for NdjsonRecordStore {
    async fn save(&self, record: AnalysisRecord) -> Result<RecordId, StoreError> {
        let record = prepare_for_storage(record);
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        // One writer at a time keeps each line contiguous in the file.
        let mut file = self.file.lock().await;
        // A previous partial write leaves a fragment; start on a fresh line.
        if has_torn_tail(&mut file).await? {
            line.insert(0, b'\n');
        }
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;

        Ok(record.id)
    }
}

/// In-process store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<AnalysisRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AnalysisRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: AnalysisRecord) -> Result<RecordId, StoreError> {
        let record = prepare_for_storage(record);
        let id = record.id.clone();
        self.records.lock().await.push(record);
        Ok(id)
    }
}

/// Opens the store named by `url`: `file://<path>` or `memory://`.
pub async fn open_record_store(url: &str) -> Result<Arc<dyn RecordStore>, StoreError> {
    if let Some(path) = url.strip_prefix("file://") {
        if path.is_empty() {
            return Err(StoreError::UnsupportedUrl(url.to_string()));
        }
        let store = NdjsonRecordStore::open(path).await?;
        return Ok(Arc::new(store));
    }
    if url == "memory://" {
        return Ok(Arc::new(MemoryRecordStore::new()));
    }
    Err(StoreError::UnsupportedUrl(url.to_string()))
}
