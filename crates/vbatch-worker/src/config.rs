//! Worker configuration.
//!
//! Effective encoder process concurrency is `max_concurrent * worker_count`:
//! every in-flight item may run up to `worker_count` encoder processes.

use std::path::PathBuf;
use std::time::Duration;

use vbatch_models::{EncodingConfig, Feature, Pipeline};

use crate::error::{WorkerError, WorkerResult};
use crate::quality::{SliceQualityPolicy, TranscriptQualityPolicy};

/// Batch worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory scanned for inputs
    pub input_dir: PathBuf,
    /// Root for manifests, clips, SRT files and the batch report
    pub output_dir: PathBuf,
    pub pipeline: Pipeline,
    /// Glob patterns relative to `input_dir`
    pub patterns: Vec<String>,
    /// Items processed at the same time
    pub max_concurrent: usize,
    /// Encoder processes per item
    pub worker_count: usize,
    /// Features requested from the analysis service
    pub features: Vec<Feature>,
    /// Length of synthesized ranges when shot detection finds nothing
    pub fallback_segment_secs: f64,
    /// Ranges shorter than this are never encoded
    pub min_range_secs: f64,
    pub item_retry_attempts: u32,
    pub item_retry_max_backoff: Duration,
    /// Skip transcribe items whose SRT already exists
    pub skip_existing: bool,
    /// Report file name inside `output_dir`
    pub report_file: String,
    pub encoding: EncodingConfig,
    pub slice_quality: SliceQualityPolicy,
    pub transcript_quality: TranscriptQualityPolicy,
    /// Known terms that misrecognised words are corrected towards
    pub professional_terms: Vec<String>,
    /// JSON rewrite rules applied before term matching
    pub term_rules_file: Option<PathBuf>,
    /// Minimum similarity for a term correction
    pub term_similarity: f64,
}

/// Default glob patterns for a pipeline.
pub fn default_patterns(pipeline: Pipeline) -> Vec<String> {
    let patterns: &[&str] = match pipeline {
        Pipeline::Slice => &["*.mp4", "*.avi", "*.mov", "*.mkv"],
        Pipeline::Transcribe => &[
            "*.mp4", "*.avi", "*.mov", "*.mkv", "*.webm", "*.mp3", "*.wav", "*.m4a", "*.flac",
        ],
    };
    patterns.iter().map(|p| p.to_string()).collect()
}

/// Default analysis features for a pipeline.
pub fn default_features(pipeline: Pipeline) -> Vec<Feature> {
    match pipeline {
        Pipeline::Slice => vec![Feature::ShotDetection],
        Pipeline::Transcribe => vec![Feature::Transcription],
    }
}

impl WorkerConfig {
    /// Config with defaults for everything but the input directory.
    pub fn new(input_dir: impl Into<PathBuf>, pipeline: Pipeline) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: PathBuf::from("./output"),
            pipeline,
            patterns: default_patterns(pipeline),
            max_concurrent: 3,
            worker_count: 4,
            features: default_features(pipeline),
            fallback_segment_secs: 10.0,
            min_range_secs: 1.0,
            item_retry_attempts: 3,
            item_retry_max_backoff: Duration::from_secs(120),
            skip_existing: true,
            report_file: "batch_report.json".to_string(),
            encoding: EncodingConfig::default(),
            slice_quality: SliceQualityPolicy::default(),
            transcript_quality: TranscriptQualityPolicy::default(),
            professional_terms: Vec::new(),
            term_rules_file: None,
            term_similarity: 0.8,
        }
    }

    /// Create config from `VBATCH_*` environment variables.
    ///
    /// Only `VBATCH_INPUT_DIR` is required; invalid pipeline or feature
    /// names are configuration errors, other unparsable values fall back to
    /// defaults.
    pub fn from_env() -> WorkerResult<Self> {
        let input_dir = std::env::var("VBATCH_INPUT_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| WorkerError::config_error("VBATCH_INPUT_DIR not set"))?;

        let pipeline = match std::env::var("VBATCH_PIPELINE") {
            Ok(s) => s
                .parse::<Pipeline>()
                .map_err(|e| WorkerError::config_error(e.to_string()))?,
            Err(_) => Pipeline::default(),
        };

        let mut config = Self::new(input_dir, pipeline);

        if let Ok(dir) = std::env::var("VBATCH_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(patterns) = std::env::var("VBATCH_PATTERNS") {
            let patterns = split_list(&patterns);
            if !patterns.is_empty() {
                config.patterns = patterns;
            }
        }
        if let Ok(features) = std::env::var("VBATCH_FEATURES") {
            let features = Feature::parse_list(&features).map_err(|e| WorkerError::config_error(e.to_string()))?;
            if !features.is_empty() {
                config.features = features;
            }
        }

        config.max_concurrent = env_parse("VBATCH_MAX_CONCURRENT", config.max_concurrent).max(1);
        config.worker_count = env_parse("VBATCH_WORKER_COUNT", config.worker_count).max(1);
        config.fallback_segment_secs = env_parse("VBATCH_FALLBACK_SEGMENT_SECS", config.fallback_segment_secs);
        config.min_range_secs = env_parse("VBATCH_MIN_RANGE_SECS", config.min_range_secs);
        config.item_retry_attempts = env_parse("VBATCH_ITEM_RETRY_ATTEMPTS", config.item_retry_attempts).max(1);
        config.item_retry_max_backoff = Duration::from_secs(env_parse(
            "VBATCH_ITEM_RETRY_MAX_BACKOFF_SECS",
            config.item_retry_max_backoff.as_secs(),
        ));
        config.skip_existing = std::env::var("VBATCH_SKIP_EXISTING")
            .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
            .unwrap_or(config.skip_existing);
        if let Ok(name) = std::env::var("VBATCH_REPORT_FILE") {
            config.report_file = name;
        }

        if let Ok(terms) = std::env::var("VBATCH_PROFESSIONAL_TERMS") {
            config.professional_terms = split_list(&terms);
        }
        config.term_rules_file = std::env::var("VBATCH_TERM_RULES_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        config.term_similarity = env_parse("VBATCH_TERM_SIMILARITY", config.term_similarity);

        config.encoding = EncodingConfig::from_env();
        config.slice_quality = SliceQualityPolicy::from_env();
        config.transcript_quality = TranscriptQualityPolicy::from_env();

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a usable batch.
    pub fn validate(&self) -> WorkerResult<()> {
        if !(self.min_range_secs >= 0.0) {
            return Err(WorkerError::config_error("VBATCH_MIN_RANGE_SECS must not be negative"));
        }
        if !(self.fallback_segment_secs > 0.0) || self.fallback_segment_secs < self.min_range_secs {
            return Err(WorkerError::config_error(format!(
                "VBATCH_FALLBACK_SEGMENT_SECS must be positive and at least VBATCH_MIN_RANGE_SECS ({}), got {}",
                self.min_range_secs, self.fallback_segment_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.term_similarity) {
            return Err(WorkerError::config_error("VBATCH_TERM_SIMILARITY must be within 0..=1"));
        }
        Ok(())
    }

    /// Upper bound on encoder processes running at once.
    pub fn max_processes(&self) -> usize {
        self.max_concurrent * self.worker_count
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.report_file)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WorkerConfig::new("/data/in", Pipeline::Slice);
        assert_eq!(config.output_dir, PathBuf::from("./output"));
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.max_processes(), 12);
        assert_eq!(config.features, vec![Feature::ShotDetection]);
        assert_eq!(config.fallback_segment_secs, 10.0);
        assert_eq!(config.item_retry_max_backoff, Duration::from_secs(120));
        assert!(config.skip_existing);
        assert_eq!(config.report_path(), PathBuf::from("./output/batch_report.json"));
    }

    #[test]
    fn test_validate_fallback_length() {
        let mut config = WorkerConfig::new("/data/in", Pipeline::Slice);
        assert!(config.validate().is_ok());

        config.fallback_segment_secs = 0.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, WorkerError::ConfigError(_)));

        config.fallback_segment_secs = f64::NAN;
        assert!(config.validate().is_err());

        config.fallback_segment_secs = 1.0;
        assert!(config.validate().is_ok());

        config.term_similarity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transcribe_patterns_include_audio() {
        let patterns = default_patterns(Pipeline::Transcribe);
        assert!(patterns.contains(&"*.webm".to_string()));
        assert!(patterns.contains(&"*.flac".to_string()));
        assert!(!default_patterns(Pipeline::Slice).contains(&"*.mp3".to_string()));
        assert_eq!(default_features(Pipeline::Transcribe), vec![Feature::Transcription]);
    }
}
