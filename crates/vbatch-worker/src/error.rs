//! Worker error types.

use thiserror::Error;
use vbatch_analysis::AnalysisError;
use vbatch_media::MediaError;
use vbatch_models::{ItemState, ModelError};
use vbatch_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("no extractable ranges: {0}")]
    NoRanges(String),

    #[error("Unexpected analysis output: {0}")]
    UnexpectedOutput(String),

    #[error("Illegal state transition {from} -> {to}")]
    IllegalTransition { from: ItemState, to: ItemState },

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("Report aggregation failed: {0}")]
    Aggregation(String),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn discovery_failed(msg: impl Into<String>) -> Self {
        Self::DiscoveryFailed(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn no_ranges(msg: impl Into<String>) -> Self {
        Self::NoRanges(msg.into())
    }

    /// Check if another attempt at the item could succeed.
    ///
    /// Covers every transient class: remote timeouts, 5xx, 429, network
    /// and staging hiccups, and encoder timeouts outside the extractor.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Analysis(e) => e.is_retryable(),
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Media(MediaError::Timeout(_)) => true,
            _ => false,
        }
    }

    /// Errors that abort the batch before any item is processed.
    pub fn is_structural(&self) -> bool {
        matches!(self, WorkerError::ConfigError(_) | WorkerError::DiscoveryFailed(_))
    }
}
