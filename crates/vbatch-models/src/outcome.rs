//! Per-item outcomes.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::extraction::ExtractionResult;
use crate::media::{InputItem, MediaKind};
use crate::quality::QualityReport;
use crate::transcript::TranscriptSegment;

/// Final status of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    /// Artifacts exist but did not meet the quality bar.
    QualityRejected,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Success => "success",
            ItemStatus::QualityRejected => "quality_rejected",
            ItemStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifacts produced for an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Artifacts {
    Slices(Vec<ExtractionResult>),
    Transcript(Vec<TranscriptSegment>),
}

impl Artifacts {
    pub fn len(&self) -> usize {
        match self {
            Artifacts::Slices(s) => s.len(),
            Artifacts::Transcript(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Artifacts {
    fn default() -> Self {
        Artifacts::Slices(Vec::new())
    }
}

/// Outcome record for one item, appended once to the batch report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemOutcome {
    pub item_id: String,
    pub source_path: PathBuf,
    pub media_kind: MediaKind,
    pub status: ItemStatus,
    pub artifacts: Artifacts,
    pub quality_report: Option<QualityReport>,
    pub error: Option<String>,
    /// Number of processing attempts made
    pub attempts: u32,
    /// Seconds spent on the item across attempts
    pub processing_time: f64,
    /// Output already existed, nothing was processed
    #[serde(default)]
    pub skipped: bool,
    /// Primary output file (SRT path for transcripts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl ItemOutcome {
    fn base(item: &InputItem, status: ItemStatus, artifacts: Artifacts) -> Self {
        Self {
            item_id: item.id().to_string(),
            source_path: item.path().to_path_buf(),
            media_kind: item.kind(),
            status,
            artifacts,
            quality_report: None,
            error: None,
            attempts: 1,
            processing_time: 0.0,
            skipped: false,
            output_path: None,
        }
    }

    pub fn success(item: &InputItem, artifacts: Artifacts, report: QualityReport) -> Self {
        Self {
            quality_report: Some(report),
            ..Self::base(item, ItemStatus::Success, artifacts)
        }
    }

    pub fn rejected(item: &InputItem, artifacts: Artifacts, report: QualityReport) -> Self {
        Self {
            error: report.reason.clone(),
            quality_report: Some(report),
            ..Self::base(item, ItemStatus::QualityRejected, artifacts)
        }
    }

    pub fn failed(item: &InputItem, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(item, ItemStatus::Failed, Artifacts::default())
        }
    }

    pub fn skipped(item: &InputItem, output_path: PathBuf) -> Self {
        Self {
            skipped: true,
            output_path: Some(output_path),
            ..Self::base(item, ItemStatus::Success, Artifacts::Transcript(Vec::new()))
        }
    }

    pub fn with_output_path(mut self, path: PathBuf) -> Self {
        self.output_path = Some(path);
        self
    }

    pub fn with_timing(mut self, attempts: u32, processing_time: f64) -> Self {
        self.attempts = attempts;
        self.processing_time = processing_time;
        self
    }
}
