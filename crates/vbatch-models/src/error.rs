//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Invalid time range [{start}, {end}): start must be before end")]
    InvalidRange { start: f64, end: f64 },

    #[error("Invalid transcript segment: {0}")]
    InvalidSegment(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("Unsupported media file: {0}")]
    UnsupportedMedia(String),
}

impl ModelError {
    pub fn invalid_segment(msg: impl Into<String>) -> Self {
        Self::InvalidSegment(msg.into())
    }
}
