//! Streaming batch report aggregation.
//!
//! A single aggregator task owns the [`BatchReport`]. Item tasks send their
//! outcomes over a channel; after every outcome the report is rewritten so
//! an interrupted batch still leaves a readable partial report behind.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vbatch_media::write_json_atomic;
use vbatch_models::{BatchReport, ItemOutcome};

use crate::error::WorkerResult;

/// Writes the batch report file.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the report file atomically.
    pub async fn write(&self, report: &BatchReport) -> WorkerResult<()> {
        write_json_atomic(&self.path, report).await?;
        debug!(path = %self.path.display(), completed = report.completed(), "Report written");
        Ok(())
    }
}

/// Spawn the aggregator that owns `report`.
///
/// The returned task ends once every sender is dropped and yields the
/// aggregated report. Failed intermediate writes are logged, not fatal.
pub fn spawn_aggregator(
    mut report: BatchReport,
    writer: ReportWriter,
    started: Instant,
) -> (mpsc::Sender<ItemOutcome>, JoinHandle<BatchReport>) {
    let (tx, mut rx) = mpsc::channel::<ItemOutcome>(report.total.max(1));

    let handle = tokio::spawn(async move {
        while let Some(outcome) = rx.recv().await {
            report.record(outcome);
            report.update_timing(started.elapsed().as_secs_f64());
            if let Err(e) = writer.write(&report).await {
                warn!(path = %writer.path().display(), "Failed to write partial report: {}", e);
            }
        }
        report
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbatch_models::{ConcurrencyInfo, InputItem, Pipeline};

    fn empty_report(total: usize) -> BatchReport {
        BatchReport::new(
            Pipeline::Transcribe,
            total,
            ConcurrencyInfo {
                max_concurrent: 2,
                worker_count: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_aggregator_rewrites_after_each_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("batch_report.json"));
        let (tx, handle) = spawn_aggregator(empty_report(2), writer.clone(), Instant::now());

        let first = InputItem::from_path("/in/a.mp3").unwrap();
        tx.send(ItemOutcome::failed(&first, "boom")).await.unwrap();

        // wait for the partial write
        for _ in 0..50 {
            if writer.path().exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let partial: BatchReport = serde_json::from_slice(&std::fs::read(writer.path()).unwrap()).unwrap();
        assert_eq!(partial.failed, 1);
        assert!(!partial.complete);

        let second = InputItem::from_path("/in/b.mp3").unwrap();
        tx.send(ItemOutcome::failed(&second, "boom")).await.unwrap();
        drop(tx);

        let report = handle.await.unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be makes every write fail
        let blocked = dir.path().join("report.json");
        std::fs::create_dir(&blocked).unwrap();

        let (tx, handle) = spawn_aggregator(empty_report(1), ReportWriter::new(&blocked), Instant::now());
        let item = InputItem::from_path("/in/a.mp3").unwrap();
        tx.send(ItemOutcome::failed(&item, "boom")).await.unwrap();
        drop(tx);

        let report = handle.await.unwrap();
        assert_eq!(report.failed, 1);
    }
}
