//! Analysis client error types.

use thiserror::Error;
use vbatch_storage::StorageError;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Remote operation failed: {0}")]
    OperationFailed(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Staging failed: {0}")]
    Staging(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

impl AnalysisError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn operation_failed(msg: impl Into<String>) -> Self {
        Self::OperationFailed(msg.into())
    }

    /// Failures the client retries on its own: 503, "temporarily
    /// unavailable" and connection errors.
    pub fn is_transient(&self) -> bool {
        match self {
            AnalysisError::ServiceUnavailable(_) => true,
            AnalysisError::RequestFailed { status, body } => {
                *status == 503 || mentions_unavailable(body)
            }
            AnalysisError::OperationFailed(msg) => mentions_unavailable(msg),
            AnalysisError::Network(e) => e.is_connect(),
            _ => false,
        }
    }

    /// Whether a later attempt at the whole item could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        if self.is_transient() {
            return true;
        }
        match self {
            AnalysisError::Timeout(_) | AnalysisError::Network(_) => true,
            AnalysisError::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            AnalysisError::Staging(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Build an error from a non-success HTTP response.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if status == 503 {
            AnalysisError::ServiceUnavailable(body)
        } else {
            AnalysisError::RequestFailed { status, body }
        }
    }
}

fn mentions_unavailable(msg: &str) -> bool {
    msg.to_ascii_lowercase().contains("temporarily unavailable")
}
