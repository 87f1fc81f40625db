//! Time ranges produced by shot detection or the fallback generator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A contiguous `[start, end)` interval of a media file, in seconds.
///
/// `index` is insertion order and carries no temporal meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    pub index: u32,
    pub start: f64,
    pub end: f64,
    pub label: String,
    pub confidence: f64,
}

impl TimeRange {
    /// Create a range, rejecting `start >= end` and non-finite bounds.
    pub fn new(
        index: u32,
        start: f64,
        end: f64,
        label: impl Into<String>,
        confidence: f64,
    ) -> ModelResult<Self> {
        if !start.is_finite() || !end.is_finite() || start >= end {
            return Err(ModelError::InvalidRange { start, end });
        }
        Ok(Self {
            index,
            start,
            end,
            label: label.into(),
            confidence,
        })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Label reduced to characters safe for a file name.
    pub fn file_label(&self) -> String {
        let label: String = self
            .label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if label.is_empty() {
            "segment".to_string()
        } else {
            label
        }
    }
}

/// A label detected over the whole media (e.g. "outdoor", "person").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabelAnnotation {
    pub description: String,
    pub confidence: f64,
}
