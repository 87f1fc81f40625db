//! Clip encoding configuration.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset, tuned for throughput
pub const DEFAULT_PRESET: &str = "ultrafast";
/// Default CRF
pub const DEFAULT_CRF: u8 = 28;
/// Encoder threads per process; parallelism comes from the worker pool
pub const DEFAULT_THREADS: u32 = 1;

/// Per-invocation timeout for fast presets.
pub const FAST_PRESET_TIMEOUT: Duration = Duration::from_secs(120);
/// Per-invocation timeout for quality presets.
pub const QUALITY_PRESET_TIMEOUT: Duration = Duration::from_secs(300);

const FAST_PRESETS: &[&str] = &["ultrafast", "superfast", "veryfast", "faster", "fast"];

/// Encoding settings for extracted clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "ultrafast", "medium")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Explicit timeout override in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_threads() -> u32 {
    DEFAULT_THREADS
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            threads: DEFAULT_THREADS,
            timeout_secs: None,
        }
    }
}

impl EncodingConfig {
    /// Create config from `VBATCH_ENCODE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            codec: std::env::var("VBATCH_ENCODE_CODEC").unwrap_or(defaults.codec),
            preset: std::env::var("VBATCH_ENCODE_PRESET").unwrap_or(defaults.preset),
            crf: std::env::var("VBATCH_ENCODE_CRF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.crf),
            audio_codec: std::env::var("VBATCH_ENCODE_AUDIO_CODEC").unwrap_or(defaults.audio_codec),
            threads: std::env::var("VBATCH_ENCODE_THREADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.threads),
            timeout_secs: std::env::var("VBATCH_ENCODE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Returns a new config with the given preset.
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn is_fast_preset(&self) -> bool {
        FAST_PRESETS.contains(&self.preset.as_str())
    }

    /// Timeout for a single encoder invocation.
    pub fn invocation_timeout(&self) -> Duration {
        match self.timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None if self.is_fast_preset() => FAST_PRESET_TIMEOUT,
            None => QUALITY_PRESET_TIMEOUT,
        }
    }
}
