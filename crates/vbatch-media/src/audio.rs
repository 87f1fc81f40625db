//! Audio track extraction for transcription.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Default timeout for pulling the audio track out of a video.
pub const AUDIO_EXTRACT_TIMEOUT: Duration = Duration::from_secs(600);

/// Writes the audio track of a media file to `output`.
#[async_trait]
pub trait AudioTrackExtractor: Send + Sync {
    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<()>;
}

/// MP3 audio extraction with ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegAudioExtractor {
    runner: FfmpegRunner,
}

impl Default for FfmpegAudioExtractor {
    fn default() -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(AUDIO_EXTRACT_TIMEOUT),
        }
    }
}

impl FfmpegAudioExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn build_command(input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .no_video()
            .output_args(["-acodec", "libmp3lame", "-q:a", "2"])
    }
}

#[async_trait]
impl AudioTrackExtractor for FfmpegAudioExtractor {
    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<()> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }

        self.runner.run(&Self::build_command(input, output)).await?;

        let size = tokio::fs::metadata(output)
            .await
            .map_err(|_| MediaError::FileNotFound(output.to_path_buf()))?
            .len();
        if size == 0 {
            return Err(MediaError::invalid_media(format!(
                "no audio extracted from {}",
                input.display()
            )));
        }

        info!(input = %input.display(), size, "Extracted audio track");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_command() {
        let args = FfmpegAudioExtractor::build_command(Path::new("talk.mp4"), Path::new("talk.mp3")).build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-i talk.mp4 -vn -acodec libmp3lame -q:a 2 talk.mp3"));
    }
}
