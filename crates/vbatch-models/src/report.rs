//! Batch-level report.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::feature::Pipeline;
use crate::outcome::{ItemOutcome, ItemStatus};

/// Concurrency parameters a batch ran with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConcurrencyInfo {
    /// Outer limit: items processed at once
    pub max_concurrent: usize,
    /// Inner limit: encoder processes per item
    pub worker_count: usize,
}

impl ConcurrencyInfo {
    /// Upper bound of encoder processes alive at once.
    pub fn max_processes(&self) -> usize {
        self.max_concurrent.saturating_mul(self.worker_count)
    }
}

/// Aggregated batch report, built incrementally as items complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub pipeline: Pipeline,
    /// Items discovered for this batch
    pub total: usize,
    pub succeeded: usize,
    pub quality_rejected: usize,
    pub failed: usize,
    /// Items never started because the batch was interrupted
    #[serde(default)]
    pub not_started: Vec<String>,
    pub outcomes: Vec<ItemOutcome>,
    pub concurrency: ConcurrencyInfo,
    pub wall_clock_secs: f64,
    /// Sum of per-item processing time, i.e. the sequential estimate
    pub total_item_secs: f64,
    pub average_item_secs: f64,
    pub time_saved_ratio: f64,
    pub interrupted: bool,
    pub complete: bool,
    pub generated_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn new(pipeline: Pipeline, total: usize, concurrency: ConcurrencyInfo) -> Self {
        Self {
            pipeline,
            total,
            succeeded: 0,
            quality_rejected: 0,
            failed: 0,
            not_started: Vec::new(),
            outcomes: Vec::new(),
            concurrency,
            wall_clock_secs: 0.0,
            total_item_secs: 0.0,
            average_item_secs: 0.0,
            time_saved_ratio: 0.0,
            interrupted: false,
            complete: false,
            generated_at: Utc::now(),
        }
    }

    /// Fold one completed outcome into the report.
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome.status {
            ItemStatus::Success => self.succeeded += 1,
            ItemStatus::QualityRejected => self.quality_rejected += 1,
            ItemStatus::Failed => self.failed += 1,
        }
        self.total_item_secs += outcome.processing_time;
        self.outcomes.push(outcome);
    }

    /// Items that reached a terminal status.
    pub fn completed(&self) -> usize {
        self.outcomes.len()
    }

    /// Refresh timing figures against the elapsed wall clock.
    pub fn update_timing(&mut self, wall_clock_secs: f64) {
        self.wall_clock_secs = wall_clock_secs;
        self.average_item_secs = if self.outcomes.is_empty() {
            0.0
        } else {
            self.total_item_secs / self.outcomes.len() as f64
        };
        self.time_saved_ratio = time_saved_ratio(self.total_item_secs, wall_clock_secs);
        self.generated_at = Utc::now();
    }

    /// Mark the report final.
    pub fn finalize(&mut self, wall_clock_secs: f64, not_started: Vec<String>) {
        self.interrupted = !not_started.is_empty();
        self.not_started = not_started;
        self.complete = true;
        self.update_timing(wall_clock_secs);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }

    pub fn outcome(&self, item_id: &str) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| o.item_id == item_id)
    }
}

/// `(sum of item time - wall clock) / sum of item time`, clamped to `>= 0`.
pub fn time_saved_ratio(total_item_secs: f64, wall_clock_secs: f64) -> f64 {
    if total_item_secs <= 0.0 {
        return 0.0;
    }
    ((total_item_secs - wall_clock_secs) / total_item_secs).max(0.0)
}
