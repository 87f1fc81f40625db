//! Per-item manifest files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vbatch_media::write_json_atomic;
use vbatch_models::{
    Artifacts, Feature, ItemOutcome, ItemStatus, LabelAnnotation, MediaKind, Pipeline, QualityReport,
};

use super::{StateChange, StateTrail};
use crate::error::WorkerResult;

/// `{output_dir}/{item_id}/{item_id}_manifest.json`
pub fn manifest_path(output_dir: &Path, item_id: &str) -> PathBuf {
    output_dir.join(item_id).join(format!("{}_manifest.json", item_id))
}

/// Everything known about one item once it reached a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemManifest {
    pub item_id: String,
    pub source_path: PathBuf,
    pub media_kind: MediaKind,
    pub pipeline: Pipeline,
    pub features: Vec<Feature>,
    /// Ranges or transcript segments returned by analysis (or fallback)
    pub segment_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelAnnotation>,
    pub quality_report: Option<QualityReport>,
    pub artifacts: Artifacts,
    pub status: ItemStatus,
    pub error: Option<String>,
    pub state_trail: Vec<StateChange>,
    pub generated_at: DateTime<Utc>,
}

impl ItemManifest {
    pub fn from_outcome(
        outcome: &ItemOutcome,
        pipeline: Pipeline,
        features: &[Feature],
        segment_count: usize,
        trail: &StateTrail,
    ) -> Self {
        Self {
            item_id: outcome.item_id.clone(),
            source_path: outcome.source_path.clone(),
            media_kind: outcome.media_kind,
            pipeline,
            features: features.to_vec(),
            segment_count,
            labels: Vec::new(),
            quality_report: outcome.quality_report.clone(),
            artifacts: outcome.artifacts.clone(),
            status: outcome.status,
            error: outcome.error.clone(),
            state_trail: trail.changes().to_vec(),
            generated_at: Utc::now(),
        }
    }

    pub fn with_labels(mut self, labels: Vec<LabelAnnotation>) -> Self {
        self.labels = labels;
        self
    }

    /// Write atomically under `output_dir`, returning the manifest path.
    pub async fn write(&self, output_dir: &Path) -> WorkerResult<PathBuf> {
        let path = manifest_path(output_dir, &self.item_id);
        write_json_atomic(&path, self).await?;
        Ok(path)
    }

    pub async fn read(path: &Path) -> WorkerResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbatch_models::{InputItem, ItemState};

    #[tokio::test]
    async fn test_manifest_written_under_item_dir() {
        let dir = tempfile::tempdir().unwrap();
        let item = InputItem::from_path("/in/talk.mp4").unwrap();
        let outcome = ItemOutcome::failed(&item, "boom");
        let mut trail = StateTrail::new(item.id());
        trail.advance(ItemState::Analyzing).unwrap();
        trail.fail();

        let manifest = ItemManifest::from_outcome(&outcome, Pipeline::Slice, &[Feature::ShotDetection], 0, &trail);
        let path = manifest.write(dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("talk").join("talk_manifest.json"));
        let read = ItemManifest::read(&path).await.unwrap();
        assert_eq!(read.status, ItemStatus::Failed);
        assert_eq!(read.error.as_deref(), Some("boom"));
        assert_eq!(read.state_trail.len(), 3);
        assert_eq!(read.state_trail[2].state, ItemState::Failed);
    }
}
