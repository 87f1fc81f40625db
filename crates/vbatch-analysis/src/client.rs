//! The analysis seam shared by every remote adapter.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use vbatch_models::{Backoff, Feature, LabelAnnotation, RawTranscriptSegment, RetryPolicy, TimeRange};

use crate::error::{AnalysisError, AnalysisResult};

/// Result of analysing one file. Empty lists are a valid answer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutput {
    Shots {
        ranges: Vec<TimeRange>,
        labels: Vec<LabelAnnotation>,
    },
    Transcript {
        segments: Vec<RawTranscriptSegment>,
    },
}

impl AnalysisOutput {
    /// Number of ranges or segments returned.
    pub fn segment_count(&self) -> usize {
        match self {
            AnalysisOutput::Shots { ranges, .. } => ranges.len(),
            AnalysisOutput::Transcript { segments } => segments.len(),
        }
    }
}

/// A remote service that turns a media file into segments.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, path: &Path, features: &[Feature]) -> AnalysisResult<AnalysisOutput>;

    /// Short service name for logs and manifests.
    fn service(&self) -> &'static str;
}

/// How long-running remote jobs are polled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Overall budget for one job
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(1200),
        }
    }
}

/// State of a remote job after one poll.
#[derive(Debug)]
pub enum PollStatus<T> {
    Pending,
    Done(T),
}

/// Poll `check` every `config.interval` until it reports [`PollStatus::Done`],
/// fails, or `config.timeout` elapses.
///
/// One deadline covers the whole job. Transient errors count as a pending
/// poll; any other error ends polling.
pub async fn poll_until<F, Fut, T>(config: PollConfig, job: &str, mut check: F) -> AnalysisResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AnalysisResult<PollStatus<T>>>,
{
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        match check().await {
            Ok(PollStatus::Done(value)) => {
                debug!(job, polls, elapsed_ms = started.elapsed().as_millis() as u64, "Remote job finished");
                return Ok(value);
            }
            Ok(PollStatus::Pending) => {}
            Err(e) if e.is_transient() => warn!(job, polls, "Transient error while polling: {}", e),
            Err(e) => return Err(e),
        }

        if started.elapsed() + config.interval > config.timeout {
            return Err(AnalysisError::Timeout(config.timeout.as_secs()));
        }
        tokio::time::sleep(config.interval).await;
    }
}

/// Client-layer policy: 3 attempts, 5s apart, transient errors only.
pub fn transient_retry_policy(name: &str) -> RetryPolicy<AnalysisError> {
    RetryPolicy::new(
        name,
        3,
        Backoff::Fixed(Duration::from_secs(5)),
        AnalysisError::is_transient,
    )
}
