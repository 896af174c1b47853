use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::analysis::{
    error::{AnalyzeError, StoreError, client_disconnected},
    model_client::ModelClient,
    prompt::PromptBuilder,
    store::RecordStore,
    types::{AnalysisRecord, AnalysisSuccess, ClientInfo, Outcome, RawAnalysisRequest},
};

pub const DEFAULT_STORE_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives one analysis request from validation to the persisted record.
pub struct AnalysisOrchestrator {
    prompt_builder: PromptBuilder,
    model_client: Arc<dyn ModelClient>,
    store: Arc<dyn RecordStore>,
    store_write_timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(
        prompt_builder: PromptBuilder,
        model_client: Arc<dyn ModelClient>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            prompt_builder,
            model_client,
            store,
            store_write_timeout: DEFAULT_STORE_WRITE_TIMEOUT,
        }
    }

    pub fn with_store_write_timeout(mut self, store_write_timeout: Duration) -> Self {
        self.store_write_timeout = store_write_timeout;
        self
    }

    /// Validation failures return before any provider call and are not
    /// recorded. Every other request produces exactly one save attempt,
    /// whose failure is logged and never alters the returned result.
    pub async fn handle(
        &self,
        raw: RawAnalysisRequest,
        client: ClientInfo,
        cancel: CancellationToken,
    ) -> Result<AnalysisSuccess, AnalyzeError> {
        let started_at = Instant::now();

        let request = match raw.validate() {
            Ok(request) => request,
            Err(err) => {
                tracing::info!(
                    target: "analysis",
                    reason = %err,
                    client_address = %client.address,
                    "analysis_rejected"
                );
                return Err(err.into());
            }
        };

        let prompt = self.prompt_builder.build(request.operation, &request.code);
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(client_disconnected()),
            reply = self.model_client.call(&prompt) => reply,
        };
        let response_time_ms = started_at.elapsed().as_millis() as u64;

        let outcome = match reply {
            Ok(ai_response) => Outcome::Success {
                ai_response,
                response_time_ms,
            },
            Err(failure) => Outcome::Failure {
                failure,
                response_time_ms,
            },
        };

        match &outcome {
            Outcome::Success { .. } => tracing::info!(
                target: "analysis",
                operation = request.operation.as_str(),
                code_chars = request.code.chars().count(),
                response_time_ms = response_time_ms,
                "analysis_succeeded"
            ),
            Outcome::Failure { failure, .. } => tracing::warn!(
                target: "analysis",
                operation = request.operation.as_str(),
                kind = ?failure.kind,
                provider_http_status = ?failure.provider_http_status,
                detail = failure.detail.as_deref().unwrap_or("-"),
                response_time_ms = response_time_ms,
                "analysis_failed"
            ),
        }

        let timestamp = OffsetDateTime::now_utc();
        let record = AnalysisRecord::from_outcome(
            request.code,
            request.operation.into(),
            &client,
            &outcome,
            timestamp,
        );
        self.persist(record).await;

        match outcome {
            Outcome::Success {
                ai_response,
                response_time_ms,
            } => Ok(AnalysisSuccess {
                ai_response,
                timestamp,
                response_time_ms,
            }),
            Outcome::Failure { failure, .. } => Err(AnalyzeError::Failed(failure)),
        }
    }

    async fn persist(&self, record: AnalysisRecord) {
        let record_id = record.id.clone();
        let success = record.success;
        let store = Arc::clone(&self.store);

        // The write runs on its own task so a slow store only delays the
        // response up to the write timeout; the write itself keeps going.
        let write = tokio::spawn(async move { store.save(record).await });
        let result = match tokio::time::timeout(self.store_write_timeout, write).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StoreError::Unavailable(format!(
                "record write task failed: {join_err}"
            ))),
            Err(_) => Err(StoreError::Timeout(
                self.store_write_timeout.as_millis() as u64,
            )),
        };

        match result {
            Ok(saved_id) => tracing::debug!(
                target: "analysis",
                record_id = %saved_id,
                success = success,
                "analysis_record_saved"
            ),
            Err(err) => tracing::error!(
                target: "analysis",
                record_id = %record_id,
                success = success,
                error = %err,
                "analysis_record_save_failed"
            ),
        }
    }
}
