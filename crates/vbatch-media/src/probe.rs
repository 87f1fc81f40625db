//! FFprobe duration probing.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Default timeout for a probe invocation.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns the total duration of a media file in seconds.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration(&self, path: &Path) -> MediaResult<f64>;
}

/// [`DurationProbe`] backed by the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    binary: String,
    timeout: Duration,
}

impl Default for FfprobeDurationProbe {
    fn default() -> Self {
        Self {
            binary: "ffprobe".to_string(),
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl FfprobeDurationProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration(&self, path: &Path) -> MediaResult<f64> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let program = which::which(&self.binary).map_err(|_| MediaError::FfprobeNotFound)?;

        let mut cmd = Command::new(program);
        cmd.args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| MediaError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            return Err(MediaError::FfprobeFailed {
                message: "FFprobe exited with non-zero status".to_string(),
                stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
            });
        }

        let duration = parse_duration_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(path = %path.display(), duration, "Probed media duration");
        Ok(duration)
    }
}

/// Parse the `format=duration` csv output of ffprobe.
pub fn parse_duration_output(stdout: &str) -> MediaResult<f64> {
    let value = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| MediaError::invalid_media("ffprobe reported no duration"))?;

    value
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())
        .ok_or_else(|| MediaError::invalid_media(format!("unparsable duration '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_output() {
        assert_eq!(parse_duration_output("25.032000\n").unwrap(), 25.032);
        assert_eq!(parse_duration_output("\n  12\n").unwrap(), 12.0);
        assert!(parse_duration_output("N/A\n").is_err());
        assert!(parse_duration_output("").is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let probe = FfprobeDurationProbe::new();
        let err = probe.duration(Path::new("/nonexistent/clip.mp4")).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
