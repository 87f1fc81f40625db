//! Segment encoders.

use std::path::PathBuf;

use async_trait::async_trait;
use vbatch_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// One encoder invocation: cut `duration` seconds starting at `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start: f64,
    pub duration: f64,
}

/// Encodes a single segment of a media file into its own output file.
///
/// Implementations must not share mutable state between invocations.
#[async_trait]
pub trait SegmentEncoder: Send + Sync {
    async fn encode(&self, job: &EncodeJob) -> MediaResult<()>;
}

/// [`SegmentEncoder`] running one `ffmpeg` process per segment.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    encoding: EncodingConfig,
    runner: FfmpegRunner,
}

impl FfmpegEncoder {
    pub fn new(encoding: EncodingConfig) -> Self {
        let runner = FfmpegRunner::new().with_timeout(encoding.invocation_timeout());
        Self { encoding, runner }
    }

    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    /// Command for one job. Offsets are start + duration, never an end time.
    pub fn build_command(&self, job: &EncodeJob) -> FfmpegCommand {
        FfmpegCommand::new(&job.input, &job.output)
            .seek(job.start)
            .duration(job.duration)
            .video_codec(&self.encoding.codec)
            .audio_codec(&self.encoding.audio_codec)
            .preset(&self.encoding.preset)
            .crf(self.encoding.crf)
            .threads(self.encoding.threads)
            .reset_timestamps()
    }
}

#[async_trait]
impl SegmentEncoder for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob) -> MediaResult<()> {
        let cmd = self.build_command(job);
        self.runner.run(&cmd).await
    }
}
