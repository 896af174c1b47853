pub mod credentials;
pub mod error;
pub mod model_client;
pub mod orchestrator;
pub mod prompt;
pub mod store;
pub mod types;

pub use error::{AnalysisFailure, AnalyzeError, FailureKind, StoreError, ValidationError};
pub use model_client::{HttpModelClient, ModelClient};
pub use orchestrator::AnalysisOrchestrator;
pub use prompt::{PromptBuilder, PromptPayload};
pub use store::{
    MemoryRecordStore, NdjsonRecordStore, RecordScan, RecordStore, open_record_store,
};
pub use types::{
    AnalysisOperation, AnalysisRecord, AnalysisRequest, AnalysisSuccess, ClientInfo, Operation,
    Outcome, RawAnalysisRequest, RecordId,
};
