use std::fmt;

use serde::{Deserialize, Serialize};

/// Classified failure of an analysis attempt that got past validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    UpstreamAuth,
    RateLimited,
    BadUpstreamRequest,
    UpstreamUnavailable,
    ClientDisconnected,
}

impl FailureKind {
    /// Caller-facing text. Persisted as `errorMessage` on failure records.
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::Timeout => {
                "Request timed out. Please try again with shorter code or check your connection."
            }
            FailureKind::UpstreamAuth => {
                "AI service authentication failed. Please contact support."
            }
            FailureKind::RateLimited => {
                "AI service rate limit exceeded. Please try again in a few minutes."
            }
            FailureKind::BadUpstreamRequest => {
                "Invalid request to AI service. Please check your code and try again."
            }
            FailureKind::UpstreamUnavailable => {
                "An error occurred while analyzing your code. Please try again later."
            }
            FailureKind::ClientDisconnected => {
                "Client closed the request before analysis completed."
            }
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            FailureKind::Timeout => 408,
            FailureKind::UpstreamAuth => 500,
            FailureKind::RateLimited => 429,
            FailureKind::BadUpstreamRequest => 400,
            FailureKind::UpstreamUnavailable => 500,
            FailureKind::ClientDisconnected => 499,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFailure {
    pub kind: FailureKind,
    pub message: String,
    pub provider_http_status: Option<u16>,
    /// Diagnostic text for logs. Never sent to the caller.
    pub detail: Option<String>,
}

impl AnalysisFailure {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            message: kind.user_message().to_string(),
            provider_http_status: None,
            detail: None,
        }
    }

    pub fn with_provider_http_status(mut self, status: u16) -> Self {
        self.provider_http_status = Some(status);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.provider_http_status, &self.detail) {
            (Some(status), Some(detail)) => {
                write!(f, "{:?} (status={}): {}", self.kind, status, detail)
            }
            (Some(status), None) => write!(f, "{:?} (status={})", self.kind, status),
            (None, Some(detail)) => write!(f, "{:?}: {}", self.kind, detail),
            (None, None) => write!(f, "{:?}", self.kind),
        }
    }
}

impl std::error::Error for AnalysisFailure {}

pub fn timeout(detail: impl Into<String>) -> AnalysisFailure {
    AnalysisFailure::new(FailureKind::Timeout).with_detail(detail)
}

pub fn upstream_auth(detail: impl Into<String>) -> AnalysisFailure {
    AnalysisFailure::new(FailureKind::UpstreamAuth).with_detail(detail)
}

pub fn upstream_unavailable(detail: impl Into<String>) -> AnalysisFailure {
    AnalysisFailure::new(FailureKind::UpstreamUnavailable).with_detail(detail)
}

pub fn client_disconnected() -> AnalysisFailure {
    AnalysisFailure::new(FailureKind::ClientDisconnected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    MissingFields,
    InvalidOperation,
    CodeTooLong,
    InvalidBody,
    BodyTooLarge,
}

impl ValidationError {
    pub fn message(self) -> &'static str {
        match self {
            ValidationError::MissingFields => "Missing required fields: code and operation",
            ValidationError::InvalidOperation => {
                "Invalid operation. Must be one of: explain, fix, optimize"
            }
            ValidationError::CodeTooLong => "Code is too long. Maximum 50,000 characters allowed.",
            ValidationError::InvalidBody => "Invalid JSON body",
            ValidationError::BodyTooLarge => "Request body too large",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ValidationError::BodyTooLarge => 413,
            _ => 400,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("record store write timed out after {0} ms")]
    Timeout(u64),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported record store url '{0}'")]
    UnsupportedUrl(String),
}

/// Everything the orchestrator can hand back to the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("validation failed: {0}")]
    Validation(ValidationError),
    #[error("analysis failed: {0}")]
    Failed(AnalysisFailure),
}

impl AnalyzeError {
    pub fn http_status(&self) -> u16 {
        match self {
            AnalyzeError::Validation(err) => err.http_status(),
            AnalyzeError::Failed(failure) => failure.kind.http_status(),
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            AnalyzeError::Validation(err) => err.message(),
            AnalyzeError::Failed(failure) => &failure.message,
        }
    }
}

impl From<ValidationError> for AnalyzeError {
    fn from(err: ValidationError) -> Self {
        AnalyzeError::Validation(err)
    }
}

impl From<AnalysisFailure> for AnalyzeError {
    fn from(failure: AnalysisFailure) -> Self {
        AnalyzeError::Failed(failure)
    }
}
