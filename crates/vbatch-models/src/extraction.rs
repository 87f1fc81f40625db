//! Per-range extraction results.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::range::TimeRange;

/// Outcome of one encoder invocation for one [`TimeRange`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResult {
    /// Index of the source range
    pub index: u32,
    pub output_path: PathBuf,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    /// Size of the produced file (0 on failure)
    pub size_bytes: u64,
    /// Wall time spent on this range, in seconds
    pub processing_time: f64,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ExtractionResult {
    pub fn success(range: &TimeRange, output_path: PathBuf, size_bytes: u64, processing_time: f64) -> Self {
        Self {
            index: range.index,
            output_path,
            start: range.start,
            end: range.end,
            duration: range.duration(),
            size_bytes,
            processing_time,
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(
        range: &TimeRange,
        output_path: PathBuf,
        processing_time: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            index: range.index,
            output_path,
            start: range.start,
            end: range.end,
            duration: range.duration(),
            size_bytes: 0,
            processing_time,
            succeeded: false,
            error_detail: Some(error.into()),
        }
    }
}
