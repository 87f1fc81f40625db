//! FFmpeg CLI wrapper for the vbatch pipelines.
//!
//! This crate provides:
//! - FFmpeg command building and a kill-on-timeout runner
//! - Duration probing via ffprobe
//! - Bounded-concurrency segment extraction
//! - Audio track extraction
//! - SRT rendering and parsing
//! - Atomic file writes for reports

pub mod audio;
pub mod command;
pub mod encoder;
pub mod error;
pub mod extract;
pub mod fs_utils;
pub mod probe;
pub mod subtitle;

pub use audio::{AudioTrackExtractor, FfmpegAudioExtractor};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use encoder::{EncodeJob, FfmpegEncoder, SegmentEncoder};
pub use error::{MediaError, MediaResult};
pub use extract::{SegmentExtractor, MIN_OUTPUT_BYTES, MIN_RANGE_SECS};
pub use fs_utils::{write_atomic, write_json_atomic};
pub use probe::{DurationProbe, FfprobeDurationProbe};
pub use subtitle::{parse_srt, to_srt};
