//! Transcribe pipeline: audio track, remote transcription, gate, SRT.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use vbatch_analysis::{AnalysisClient, AnalysisOutput};
use vbatch_media::{to_srt, write_atomic, AudioTrackExtractor};
use vbatch_models::{Artifacts, Feature, InputItem, ItemOutcome, ItemState, MediaKind, Pipeline};

use super::manifest::ItemManifest;
use super::{ItemPipeline, StateTrail};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::ItemLogger;
use crate::metrics;
use crate::quality::TranscriptQualityPolicy;
use crate::terms::TermCorrector;

/// `{output_dir}/{item_id}.srt`
pub fn srt_path(output_dir: &Path, item_id: &str) -> PathBuf {
    output_dir.join(format!("{}.srt", item_id))
}

/// Turns each input into an SRT subtitle file.
pub struct TranscribePipeline {
    analysis: Arc<dyn AnalysisClient>,
    audio: Arc<dyn AudioTrackExtractor>,
    policy: TranscriptQualityPolicy,
    features: Vec<Feature>,
    output_dir: PathBuf,
    skip_existing: bool,
    corrector: Option<TermCorrector>,
}

impl TranscribePipeline {
    pub fn new(
        config: &WorkerConfig,
        analysis: Arc<dyn AnalysisClient>,
        audio: Arc<dyn AudioTrackExtractor>,
    ) -> Self {
        Self {
            analysis,
            audio,
            policy: config.transcript_quality.clone(),
            features: config.features.clone(),
            output_dir: config.output_dir.clone(),
            skip_existing: config.skip_existing,
            corrector: None,
        }
    }

    /// Correct professional terms in accepted segments before writing.
    pub fn with_term_corrector(mut self, corrector: TermCorrector) -> Self {
        self.corrector = Some(corrector);
        self
    }

    async fn transcribe(&self, item: &InputItem, logger: &ItemLogger) -> WorkerResult<AnalysisOutput> {
        if item.kind() == MediaKind::Audio {
            return Ok(self.analysis.analyze(item.path(), &self.features).await?);
        }

        // The temp dir is removed when it drops, on success or failure.
        let scratch = tempfile::tempdir()?;
        let audio_path = scratch.path().join(format!("{}.mp3", item.id()));
        self.audio.extract_audio(item.path(), &audio_path).await?;
        logger.log_progress("audio track extracted");

        Ok(self.analysis.analyze(&audio_path, &self.features).await?)
    }
}

#[async_trait]
impl ItemPipeline for TranscribePipeline {
    fn pipeline(&self) -> Pipeline {
        Pipeline::Transcribe
    }

    async fn process(&self, item: &InputItem, trail: &mut StateTrail) -> WorkerResult<ItemOutcome> {
        let logger = ItemLogger::new(item.id(), Pipeline::Transcribe);
        let srt = srt_path(&self.output_dir, item.id());

        if self.skip_existing && srt.exists() {
            logger.log_progress("subtitle file already exists, skipping");
            return Ok(ItemOutcome::skipped(item, srt));
        }
        logger.log_start(&item.file_name());

        trail.advance(ItemState::Analyzing)?;
        let segments = match self.transcribe(item, &logger).await? {
            AnalysisOutput::Transcript { segments } => segments,
            other => {
                return Err(WorkerError::UnexpectedOutput(format!(
                    "{} returned {} shot ranges instead of a transcript",
                    self.analysis.service(),
                    other.segment_count()
                )))
            }
        };
        logger.log_progress(&format!("{} transcript segments", segments.len()));

        trail.advance(ItemState::QualityChecking)?;
        let report = self.policy.evaluate(&segments);
        metrics::record_quality(Pipeline::Transcribe, report.passed);
        let mut accepted = self.policy.accepted_segments(&segments);

        let outcome = if report.passed {
            if let Some(corrector) = &self.corrector {
                let changed = corrector.correct_segments(&mut accepted);
                if changed > 0 {
                    metrics::record_term_corrections(changed);
                    logger.log_progress(&format!("corrected terms in {} segments", changed));
                }
            }
            write_atomic(&srt, to_srt(&accepted)).await?;
            trail.advance(ItemState::Accepted)?;
            logger.log_completion(&format!("{} subtitles written to {}", accepted.len(), srt.display()));
            ItemOutcome::success(item, Artifacts::Transcript(accepted), report).with_output_path(srt)
        } else {
            trail.advance(ItemState::Rejected)?;
            logger.log_warning(&format!(
                "quality rejected: {}",
                report.reason.as_deref().unwrap_or("unknown")
            ));
            ItemOutcome::rejected(item, Artifacts::Transcript(accepted), report)
        };

        ItemManifest::from_outcome(&outcome, Pipeline::Transcribe, &self.features, segments.len(), trail)
            .write(&self.output_dir)
            .await?;

        Ok(outcome)
    }

    async fn finalize_failure(&self, item: &InputItem, outcome: &ItemOutcome, trail: &StateTrail) -> WorkerResult<()> {
        ItemLogger::new(item.id(), Pipeline::Transcribe).log_error(outcome.error.as_deref().unwrap_or("failed"));
        ItemManifest::from_outcome(outcome, Pipeline::Transcribe, &self.features, 0, trail)
            .write(&self.output_dir)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use vbatch_analysis::AnalysisResult;
    use vbatch_media::MediaResult;
    use vbatch_models::{ItemStatus, RawTranscriptSegment};

    use crate::pipeline::manifest::manifest_path;

    struct TranscriptClient {
        segments: Vec<RawTranscriptSegment>,
        seen: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl AnalysisClient for TranscriptClient {
        async fn analyze(&self, path: &Path, _features: &[Feature]) -> AnalysisResult<AnalysisOutput> {
            self.seen.lock().unwrap().push(path.to_path_buf());
            Ok(AnalysisOutput::Transcript {
                segments: self.segments.clone(),
            })
        }

        fn service(&self) -> &'static str {
            "fake"
        }
    }

    #[derive(Default)]
    struct FakeAudio {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AudioTrackExtractor for FakeAudio {
        async fn extract_audio(&self, _input: &Path, output: &Path) -> MediaResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(output, b"ID3").await?;
            Ok(())
        }
    }

    fn setup(
        out: &Path,
        segments: Vec<RawTranscriptSegment>,
    ) -> (TranscribePipeline, Arc<TranscriptClient>, Arc<FakeAudio>) {
        let mut config = WorkerConfig::new("/in", Pipeline::Transcribe);
        config.output_dir = out.to_path_buf();
        let client = Arc::new(TranscriptClient {
            segments,
            seen: Mutex::new(Vec::new()),
        });
        let audio = Arc::new(FakeAudio::default());
        let pipeline = TranscribePipeline::new(&config, client.clone(), audio.clone());
        (pipeline, client, audio)
    }

    fn good_segments() -> Vec<RawTranscriptSegment> {
        vec![
            RawTranscriptSegment::new(0.0, 1.5, "hello"),
            RawTranscriptSegment::new(1.5, 3.0, "world"),
        ]
    }

    #[tokio::test]
    async fn test_audio_item_writes_srt() {
        let out = tempfile::tempdir().unwrap();
        let (pipeline, client, audio) = setup(out.path(), good_segments());
        let item = InputItem::from_path("/in/talk.mp3").unwrap();
        let mut trail = StateTrail::new(item.id());

        let outcome = pipeline.process(&item, &mut trail).await.unwrap();

        assert_eq!(outcome.status, ItemStatus::Success);
        assert_eq!(audio.calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.seen.lock().unwrap()[0], PathBuf::from("/in/talk.mp3"));

        let srt = std::fs::read_to_string(srt_path(out.path(), "talk")).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,500\nhello\n"));
        assert!(srt.contains("2\n00:00:01,500 --> 00:00:03,000\nworld\n"));
        assert_eq!(
            trail.states(),
            vec![
                ItemState::Pending,
                ItemState::Analyzing,
                ItemState::QualityChecking,
                ItemState::Accepted
            ]
        );
        assert!(manifest_path(out.path(), "talk").exists());
    }

    #[tokio::test]
    async fn test_video_item_extracts_audio_first() {
        let out = tempfile::tempdir().unwrap();
        let (pipeline, client, audio) = setup(out.path(), good_segments());
        let item = InputItem::from_path("/in/lecture.mkv").unwrap();
        let mut trail = StateTrail::new(item.id());

        pipeline.process(&item, &mut trail).await.unwrap();

        assert_eq!(audio.calls.load(Ordering::SeqCst), 1);
        let seen = client.seen.lock().unwrap()[0].clone();
        assert_eq!(seen.file_name().unwrap(), "lecture.mp3");
        // scratch audio does not outlive the attempt
        assert!(!seen.exists());
    }

    #[tokio::test]
    async fn test_existing_srt_is_skipped() {
        let out = tempfile::tempdir().unwrap();
        std::fs::write(srt_path(out.path(), "talk"), "1\n").unwrap();
        let (pipeline, client, _) = setup(out.path(), good_segments());
        let item = InputItem::from_path("/in/talk.wav").unwrap();
        let mut trail = StateTrail::new(item.id());

        let outcome = pipeline.process(&item, &mut trail).await.unwrap();

        assert!(outcome.skipped);
        assert_eq!(outcome.status, ItemStatus::Success);
        assert!(client.seen.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(srt_path(out.path(), "talk")).unwrap(), "1\n");
    }

    #[tokio::test]
    async fn test_rejected_transcript_writes_no_srt() {
        let out = tempfile::tempdir().unwrap();
        let segments = vec![
            RawTranscriptSegment::new(0.0, 1.0, "ok"),
            RawTranscriptSegment::new(2.0, 1.0, "backwards"),
        ];
        let (pipeline, _, _) = setup(out.path(), segments);
        let item = InputItem::from_path("/in/noisy.mp3").unwrap();
        let mut trail = StateTrail::new(item.id());

        let outcome = pipeline.process(&item, &mut trail).await.unwrap();

        assert_eq!(outcome.status, ItemStatus::QualityRejected);
        assert!(!srt_path(out.path(), "noisy").exists());
        assert!(outcome.output_path.is_none());

        let manifest = ItemManifest::read(&manifest_path(out.path(), "noisy")).await.unwrap();
        assert_eq!(manifest.status, ItemStatus::QualityRejected);
        assert_eq!(manifest.segment_count, 2);
    }

    #[tokio::test]
    async fn test_terms_corrected_before_srt_written() {
        let out = tempfile::tempdir().unwrap();
        let segments = vec![
            RawTranscriptSegment::new(0.0, 1.5, "we deploy on kubernetis"),
            RawTranscriptSegment::new(1.5, 3.0, "protein O-P-N"),
        ];
        let (pipeline, _, _) = setup(out.path(), segments);
        let corrector = TermCorrector::new(vec!["Kubernetes".into()], 0.8)
            .with_rule(r"O-P-N", "OPN")
            .unwrap();
        let pipeline = pipeline.with_term_corrector(corrector);
        let item = InputItem::from_path("/in/talk.mp3").unwrap();
        let mut trail = StateTrail::new(item.id());

        let outcome = pipeline.process(&item, &mut trail).await.unwrap();

        assert_eq!(outcome.status, ItemStatus::Success);
        let srt = std::fs::read_to_string(srt_path(out.path(), "talk")).unwrap();
        assert!(srt.contains("\nwe deploy on Kubernetes\n"), "{}", srt);
        assert!(srt.contains("\nprotein OPN\n"), "{}", srt);
    }

    #[tokio::test]
    async fn test_empty_transcript_rejected() {
        let out = tempfile::tempdir().unwrap();
        let (pipeline, _, _) = setup(out.path(), Vec::new());
        let item = InputItem::from_path("/in/silence.flac").unwrap();
        let mut trail = StateTrail::new(item.id());

        let outcome = pipeline.process(&item, &mut trail).await.unwrap();
        assert_eq!(outcome.status, ItemStatus::QualityRejected);
        assert_eq!(outcome.error.as_deref(), Some("no segments"));
    }
}
