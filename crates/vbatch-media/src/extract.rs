//! Concurrent segment extraction.
//!
//! One encoder invocation per range, bounded by a worker-count semaphore.
//! Every submitted range yields exactly one [`ExtractionResult`]; a failing
//! range never affects its siblings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};
use vbatch_models::{ExtractionResult, TimeRange};

use crate::encoder::{EncodeJob, SegmentEncoder};
use crate::error::{MediaError, MediaResult};

/// Ranges shorter than this are never submitted.
pub const MIN_RANGE_SECS: f64 = 1.0;
/// Smallest output accepted as a real clip.
pub const MIN_OUTPUT_BYTES: u64 = 1024;
/// Default number of concurrent encoder processes per item.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Extracts many ranges of one media file with bounded parallelism.
#[derive(Clone)]
pub struct SegmentExtractor {
    encoder: Arc<dyn SegmentEncoder>,
    worker_count: usize,
    min_range_secs: f64,
    min_output_bytes: u64,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl SegmentExtractor {
    pub fn new(encoder: Arc<dyn SegmentEncoder>, worker_count: usize) -> Self {
        Self {
            encoder,
            worker_count: worker_count.max(1),
            min_range_secs: MIN_RANGE_SECS,
            min_output_bytes: MIN_OUTPUT_BYTES,
            cancel_rx: None,
        }
    }

    pub fn with_min_range_secs(mut self, secs: f64) -> Self {
        self.min_range_secs = secs;
        self
    }

    pub fn with_min_output_bytes(mut self, bytes: u64) -> Self {
        self.min_output_bytes = bytes;
        self
    }

    /// Ranges not yet started are reported as cancelled once this flips to true.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Ranges long enough to be submitted to the encoder.
    pub fn submittable<'a>(&self, ranges: &'a [TimeRange]) -> Vec<&'a TimeRange> {
        ranges
            .iter()
            .filter(|r| r.duration() >= self.min_range_secs)
            .collect()
    }

    /// Output path for one range.
    pub fn output_path(output_dir: &Path, item_id: &str, range: &TimeRange) -> PathBuf {
        output_dir.join(format!(
            "{}_seg_{:03}_{}.mp4",
            item_id,
            range.index,
            range.file_label()
        ))
    }

    /// Extract every submittable range of `input` into `output_dir`.
    ///
    /// Only failing to create `output_dir` is an error; per-range failures
    /// are recorded in the returned results.
    pub async fn extract_all(
        &self,
        input: &Path,
        item_id: &str,
        ranges: &[TimeRange],
        output_dir: &Path,
    ) -> MediaResult<Vec<ExtractionResult>> {
        tokio::fs::create_dir_all(output_dir).await?;

        let submitted = self.submittable(ranges);
        let skipped = ranges.len() - submitted.len();
        if skipped > 0 {
            debug!(item_id, skipped, "Skipping ranges shorter than {}s", self.min_range_secs);
        }

        info!(
            item_id,
            ranges = submitted.len(),
            workers = self.worker_count,
            "Extracting segments"
        );

        let started = Instant::now();
        let semaphore = Semaphore::new(self.worker_count);
        let results = join_all(
            submitted
                .into_iter()
                .map(|range| self.extract_one(&semaphore, input, item_id, range, output_dir)),
        )
        .await;

        let wall_clock = started.elapsed().as_secs_f64();
        let succeeded = results.iter().filter(|r| r.succeeded).count();
        let busy: f64 = results.iter().map(|r| r.processing_time).sum();
        let speedup = if wall_clock > 0.0 { busy / wall_clock } else { 0.0 };

        info!(
            item_id,
            succeeded,
            failed = results.len() - succeeded,
            wall_clock_secs = wall_clock,
            speedup,
            "Segment extraction finished"
        );

        Ok(results)
    }

    async fn extract_one(
        &self,
        semaphore: &Semaphore,
        input: &Path,
        item_id: &str,
        range: &TimeRange,
        output_dir: &Path,
    ) -> ExtractionResult {
        let output = Self::output_path(output_dir, item_id, range);

        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return ExtractionResult::failure(range, output, 0.0, "worker pool closed"),
        };

        if self.is_cancelled() {
            record_extraction("cancelled");
            return ExtractionResult::failure(range, output, 0.0, MediaError::Cancelled.to_string());
        }

        let job = EncodeJob {
            input: input.to_path_buf(),
            output: output.clone(),
            start: range.start,
            duration: range.duration(),
        };

        let started = Instant::now();
        let result = match self.encoder.encode(&job).await {
            Ok(()) => self.verify_output(&output).await,
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(size) => {
                debug!(item_id, index = range.index, size, "Segment extracted");
                record_extraction("success");
                ExtractionResult::success(range, output, size, elapsed)
            }
            Err(e) => {
                warn!(item_id, index = range.index, "Segment extraction failed: {}", e);
                record_extraction("failure");
                discard_partial(&output).await;
                ExtractionResult::failure(range, output, elapsed, e.detail())
            }
        }
    }

    async fn verify_output(&self, output: &Path) -> MediaResult<u64> {
        let metadata = tokio::fs::metadata(output)
            .await
            .map_err(|_| MediaError::FileNotFound(output.to_path_buf()))?;

        if metadata.len() < self.min_output_bytes {
            return Err(MediaError::OutputTooSmall {
                path: output.to_path_buf(),
                size: metadata.len(),
                min: self.min_output_bytes,
            });
        }
        Ok(metadata.len())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }
}

async fn discard_partial(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %output.display(), "Failed to remove partial output: {}", e);
        }
    }
}

fn record_extraction(result: &'static str) {
    metrics::counter!("vbatch_extractions_total", "result" => result).increment(1);
}
