//! Slice pipeline: shot detection, fallback ranges, clip extraction, gate.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use vbatch_analysis::{AnalysisClient, AnalysisOutput};
use vbatch_media::{DurationProbe, MediaError, SegmentEncoder, SegmentExtractor};
use vbatch_models::{Artifacts, Feature, InputItem, ItemOutcome, ItemState, MediaKind, Pipeline};

use super::manifest::ItemManifest;
use super::{ItemPipeline, StateTrail};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::fallback::generate_fallback;
use crate::logging::ItemLogger;
use crate::metrics;
use crate::quality::SliceQualityPolicy;

/// Cuts each video into clips along detected shots.
pub struct SlicePipeline {
    analysis: Arc<dyn AnalysisClient>,
    encoder: Arc<dyn SegmentEncoder>,
    probe: Arc<dyn DurationProbe>,
    policy: SliceQualityPolicy,
    features: Vec<Feature>,
    output_dir: PathBuf,
    worker_count: usize,
    min_range_secs: f64,
    fallback_segment_secs: f64,
    cancel: Option<watch::Receiver<bool>>,
}

impl SlicePipeline {
    pub fn new(
        config: &WorkerConfig,
        analysis: Arc<dyn AnalysisClient>,
        encoder: Arc<dyn SegmentEncoder>,
        probe: Arc<dyn DurationProbe>,
    ) -> Self {
        Self {
            analysis,
            encoder,
            probe,
            policy: config.slice_quality.clone(),
            features: config.features.clone(),
            output_dir: config.output_dir.clone(),
            worker_count: config.worker_count,
            min_range_secs: config.min_range_secs,
            fallback_segment_secs: config.fallback_segment_secs,
            cancel: None,
        }
    }

    /// Stop submitting encoder work once `cancel` flips to true.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    fn extractor(&self) -> SegmentExtractor {
        let extractor = SegmentExtractor::new(Arc::clone(&self.encoder), self.worker_count)
            .with_min_range_secs(self.min_range_secs);
        match &self.cancel {
            Some(cancel) => extractor.with_cancel(cancel.clone()),
            None => extractor,
        }
    }
}

#[async_trait]
impl ItemPipeline for SlicePipeline {
    fn pipeline(&self) -> Pipeline {
        Pipeline::Slice
    }

    async fn process(&self, item: &InputItem, trail: &mut StateTrail) -> WorkerResult<ItemOutcome> {
        let logger = ItemLogger::new(item.id(), Pipeline::Slice);
        logger.log_start(&item.file_name());

        if item.kind() != MediaKind::Video {
            return Err(WorkerError::invalid_input(format!(
                "{} is {} media, slicing needs video",
                item.file_name(),
                item.kind().as_str()
            )));
        }

        trail.advance(ItemState::Analyzing)?;
        let (mut ranges, labels) = match self.analysis.analyze(item.path(), &self.features).await? {
            AnalysisOutput::Shots { ranges, labels } => (ranges, labels),
            other => {
                return Err(WorkerError::UnexpectedOutput(format!(
                    "{} returned {} transcript segments instead of shots",
                    self.analysis.service(),
                    other.segment_count()
                )))
            }
        };
        logger.log_progress(&format!("{} shots, {} labels", ranges.len(), labels.len()));

        if ranges.is_empty() {
            trail.advance(ItemState::FallbackGenerating)?;
            logger.log_warning("no shots detected, using uniform segments");
            ranges = generate_fallback(self.probe.as_ref(), item.path(), self.fallback_segment_secs).await;
            if ranges.is_empty() {
                return Err(WorkerError::no_ranges(item.file_name()));
            }
        }

        trail.advance(ItemState::Extracting)?;
        let item_dir = self.output_dir.join(item.id());
        let results = self
            .extractor()
            .extract_all(item.path(), item.id(), &ranges, &item_dir)
            .await?;

        // Clips skipped by shutdown say nothing about quality.
        if self.is_cancelled() {
            let cancelled = MediaError::Cancelled.to_string();
            let skipped = results
                .iter()
                .filter(|r| r.error_detail.as_deref() == Some(cancelled.as_str()))
                .count();
            if skipped > 0 {
                return Err(WorkerError::Interrupted(format!(
                    "{} of {} clips not extracted before shutdown",
                    skipped,
                    results.len()
                )));
            }
        }

        trail.advance(ItemState::QualityChecking)?;
        let report = self.policy.evaluate(&results);
        metrics::record_quality(Pipeline::Slice, report.passed);

        let outcome = if report.passed {
            trail.advance(ItemState::Accepted)?;
            logger.log_completion(&format!(
                "{} valid slices ({:.0}% valid)",
                report.valid_count,
                report.valid_ratio * 100.0
            ));
            ItemOutcome::success(item, Artifacts::Slices(results), report)
        } else {
            trail.advance(ItemState::Rejected)?;
            logger.log_warning(&format!(
                "quality rejected: {}",
                report.reason.as_deref().unwrap_or("unknown")
            ));
            ItemOutcome::rejected(item, Artifacts::Slices(results), report)
        }
        .with_output_path(item_dir);

        ItemManifest::from_outcome(&outcome, Pipeline::Slice, &self.features, ranges.len(), trail)
            .with_labels(labels)
            .write(&self.output_dir)
            .await?;

        Ok(outcome)
    }

    async fn finalize_failure(&self, item: &InputItem, outcome: &ItemOutcome, trail: &StateTrail) -> WorkerResult<()> {
        ItemLogger::new(item.id(), Pipeline::Slice).log_error(outcome.error.as_deref().unwrap_or("failed"));
        ItemManifest::from_outcome(outcome, Pipeline::Slice, &self.features, 0, trail)
            .write(&self.output_dir)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vbatch_analysis::AnalysisResult;
    use vbatch_media::{EncodeJob, MediaResult};
    use vbatch_models::{ItemStatus, TimeRange};

    use crate::pipeline::manifest::manifest_path;

    struct ShotsClient(Vec<TimeRange>);

    #[async_trait]
    impl AnalysisClient for ShotsClient {
        async fn analyze(&self, _path: &Path, _features: &[Feature]) -> AnalysisResult<AnalysisOutput> {
            Ok(AnalysisOutput::Shots {
                ranges: self.0.clone(),
                labels: Vec::new(),
            })
        }

        fn service(&self) -> &'static str {
            "fake"
        }
    }

    /// Writes `bytes` into every output; fails ranges whose index is listed.
    struct WritingEncoder {
        bytes: usize,
        fail_indexes: Vec<u32>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SegmentEncoder for WritingEncoder {
        async fn encode(&self, job: &EncodeJob) -> MediaResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .fail_indexes
                .iter()
                .any(|i| job.output.to_string_lossy().contains(&format!("_seg_{:03}_", i)));
            if failing {
                return Err(vbatch_media::MediaError::Timeout(120));
            }
            tokio::fs::write(&job.output, vec![0u8; self.bytes]).await?;
            Ok(())
        }
    }

    struct FixedProbe(f64);

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn duration(&self, _path: &Path) -> MediaResult<f64> {
            Ok(self.0)
        }
    }

    fn pipeline(out: &Path, shots: Vec<TimeRange>, encoder: Arc<WritingEncoder>, duration: f64) -> SlicePipeline {
        let mut config = WorkerConfig::new("/in", Pipeline::Slice);
        config.output_dir = out.to_path_buf();
        config.worker_count = 2;
        SlicePipeline::new(&config, Arc::new(ShotsClient(shots)), encoder, Arc::new(FixedProbe(duration)))
    }

    fn encoder(fail_indexes: Vec<u32>) -> Arc<WritingEncoder> {
        Arc::new(WritingEncoder {
            bytes: 4096,
            fail_indexes,
            calls: AtomicUsize::new(0),
        })
    }

    fn shots(n: u32) -> Vec<TimeRange> {
        (1..=n)
            .map(|i| TimeRange::new(i, (i - 1) as f64 * 5.0, i as f64 * 5.0, format!("shot {}", i), 1.0).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_failure_in_five_is_accepted() {
        let out = tempfile::tempdir().unwrap();
        let encoder = encoder(vec![3]);
        let pipeline = pipeline(out.path(), shots(5), encoder.clone(), 0.0);
        let item = InputItem::from_path("/in/show.mp4").unwrap();
        let mut trail = StateTrail::new(item.id());

        let outcome = pipeline.process(&item, &mut trail).await.unwrap();

        assert_eq!(outcome.status, ItemStatus::Success);
        let report = outcome.quality_report.as_ref().unwrap();
        assert_eq!(report.valid_count, 4);
        assert_eq!(report.valid_ratio, 0.8);
        assert_eq!(report.error_ratio, 0.2);
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 5);
        assert_eq!(trail.current(), ItemState::Accepted);
        assert!(manifest_path(out.path(), "show").exists());
    }

    #[tokio::test]
    async fn test_fallback_used_when_no_shots() {
        let out = tempfile::tempdir().unwrap();
        let pipeline = pipeline(out.path(), Vec::new(), encoder(Vec::new()), 25.0);
        let item = InputItem::from_path("/in/show.mp4").unwrap();
        let mut trail = StateTrail::new(item.id());

        let outcome = pipeline.process(&item, &mut trail).await.unwrap();

        assert_eq!(outcome.status, ItemStatus::Success);
        assert_eq!(outcome.artifacts.len(), 3);
        assert!(trail.states().contains(&ItemState::FallbackGenerating));

        let manifest = ItemManifest::read(&manifest_path(out.path(), "show")).await.unwrap();
        assert_eq!(manifest.segment_count, 3);
    }

    #[tokio::test]
    async fn test_no_ranges_is_hard_failure() {
        let out = tempfile::tempdir().unwrap();
        let pipeline = pipeline(out.path(), Vec::new(), encoder(Vec::new()), 0.0);
        let item = InputItem::from_path("/in/empty.mp4").unwrap();
        let mut trail = StateTrail::new(item.id());

        let err = pipeline.process(&item, &mut trail).await.unwrap_err();
        assert!(matches!(err, WorkerError::NoRanges(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_small_outputs_rejected() {
        let out = tempfile::tempdir().unwrap();
        let encoder = Arc::new(WritingEncoder {
            bytes: 1024,
            fail_indexes: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline(out.path(), shots(3), encoder, 0.0);
        let item = InputItem::from_path("/in/tiny.mp4").unwrap();
        let mut trail = StateTrail::new(item.id());

        let outcome = pipeline.process(&item, &mut trail).await.unwrap();
        assert_eq!(outcome.status, ItemStatus::QualityRejected);
        assert_eq!(outcome.error.as_deref(), Some("validRatio 0 < 0.8"));
        assert_eq!(trail.current(), ItemState::Rejected);
    }

    /// Flips the shutdown flag as soon as the first clip starts.
    struct InterruptingEncoder(watch::Sender<bool>);

    #[async_trait]
    impl SegmentEncoder for InterruptingEncoder {
        async fn encode(&self, job: &EncodeJob) -> MediaResult<()> {
            let _ = self.0.send(true);
            tokio::fs::write(&job.output, vec![0u8; 4096]).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_mid_extraction_is_interrupted_not_rejected() {
        let out = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);
        let mut config = WorkerConfig::new("/in", Pipeline::Slice);
        config.output_dir = out.path().to_path_buf();
        config.worker_count = 1;
        let pipeline = SlicePipeline::new(
            &config,
            Arc::new(ShotsClient(shots(4))),
            Arc::new(InterruptingEncoder(tx)),
            Arc::new(FixedProbe(0.0)),
        )
        .with_cancel(rx);
        let item = InputItem::from_path("/in/show.mp4").unwrap();
        let mut trail = StateTrail::new(item.id());

        let err = pipeline.process(&item, &mut trail).await.unwrap_err();

        assert!(matches!(err, WorkerError::Interrupted(_)), "{}", err);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "interrupted: 3 of 4 clips not extracted before shutdown");
        assert!(!trail.states().contains(&ItemState::QualityChecking));
        assert!(!manifest_path(out.path(), "show").exists());
    }

    #[tokio::test]
    async fn test_audio_input_rejected() {
        let out = tempfile::tempdir().unwrap();
        let pipeline = pipeline(out.path(), shots(2), encoder(Vec::new()), 0.0);
        let item = InputItem::from_path("/in/voice.mp3").unwrap();
        let mut trail = StateTrail::new(item.id());

        let err = pipeline.process(&item, &mut trail).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(_)));
    }
}
