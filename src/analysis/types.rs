use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::analysis::error::{AnalysisFailure, ValidationError};

pub const MAX_CODE_CHARS: usize = 50_000;
pub const UNKNOWN_CLIENT: &str = "unknown";
pub const UNKNOWN_LANGUAGE: &str = "unknown";

pub type RecordId = String;

/// Operation as persisted. `Unknown` only exists on the storage side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Explain,
    Fix,
    Optimize,
    Unknown,
}

/// Operation a caller may request. Closed set, matched exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOperation {
    Explain,
    Fix,
    Optimize,
}

impl AnalysisOperation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "explain" => Some(AnalysisOperation::Explain),
            "fix" => Some(AnalysisOperation::Fix),
            "optimize" => Some(AnalysisOperation::Optimize),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisOperation::Explain => "explain",
            AnalysisOperation::Fix => "fix",
            AnalysisOperation::Optimize => "optimize",
        }
    }
}

impl From<AnalysisOperation> for Operation {
    fn from(operation: AnalysisOperation) -> Self {
        match operation {
            AnalysisOperation::Explain => Operation::Explain,
            AnalysisOperation::Fix => Operation::Fix,
            AnalysisOperation::Optimize => Operation::Optimize,
        }
    }
}

/// Request body exactly as received on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAnalysisRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
}

impl RawAnalysisRequest {
    pub fn new(code: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            operation: Some(operation.into()),
        }
    }

    pub fn validate(self) -> Result<AnalysisRequest, ValidationError> {
        let (code, operation) = match (self.code, self.operation) {
            (Some(code), Some(operation)) if !code.is_empty() && !operation.is_empty() => {
                (code, operation)
            }
            _ => return Err(ValidationError::MissingFields),
        };

        let operation =
            AnalysisOperation::parse(&operation).ok_or(ValidationError::InvalidOperation)?;

        if code.chars().count() > MAX_CODE_CHARS {
            return Err(ValidationError::CodeTooLong);
        }

        Ok(AnalysisRequest { code, operation })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub code: String,
    pub operation: AnalysisOperation,
}

/// Best-effort description of who sent the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub address: String,
    pub agent: String,
}

impl ClientInfo {
    pub fn new(address: Option<String>, agent: Option<String>) -> Self {
        Self {
            address: address
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
            agent: agent
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
        }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Audit entry for one analysis attempt. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: RecordId,
    pub code: String,
    pub operation: Operation,
    #[serde(default = "default_language")]
    pub language: String,
    pub ai_response: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub client_address: String,
    pub client_agent: String,
    pub response_time_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

fn default_language() -> String {
    UNKNOWN_LANGUAGE.to_string()
}

impl AnalysisRecord {
    pub fn from_outcome(
        code: String,
        operation: Operation,
        client: &ClientInfo,
        outcome: &Outcome,
        timestamp: OffsetDateTime,
    ) -> Self {
        let (ai_response, success, error_message) = match outcome {
            Outcome::Success { ai_response, .. } => (ai_response.clone(), true, None),
            Outcome::Failure { failure, .. } => {
                (String::new(), false, Some(failure.message.clone()))
            }
        };

        Self {
            id: uuid::Uuid::now_v7().to_string(),
            code,
            operation,
            language: default_language(),
            ai_response,
            timestamp,
            client_address: client.address.clone(),
            client_agent: client.agent.clone(),
            response_time_ms: outcome.response_time_ms(),
            success,
            error_message,
        }
    }
}

/// Result of one pass through the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        ai_response: String,
        response_time_ms: u64,
    },
    Failure {
        failure: AnalysisFailure,
        response_time_ms: u64,
    },
}

impl Outcome {
    pub fn response_time_ms(&self) -> u64 {
        match self {
            Outcome::Success {
                response_time_ms, ..
            }
            | Outcome::Failure {
                response_time_ms, ..
            } => *response_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Successful analysis as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSuccess {
    pub ai_response: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
}
