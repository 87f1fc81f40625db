//! Prometheus metrics for the batch worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use vbatch_models::{ItemStatus, Pipeline};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const ITEMS_TOTAL: &str = "vbatch_items_total";
    pub const ITEM_DURATION_SECONDS: &str = "vbatch_item_duration_seconds";
    pub const ITEMS_IN_FLIGHT: &str = "vbatch_items_in_flight";
    pub const RETRIES_TOTAL: &str = "vbatch_retries_total";
    pub const QUALITY_CHECKS_TOTAL: &str = "vbatch_quality_checks_total";
    pub const BATCH_DURATION_SECONDS: &str = "vbatch_batch_duration_seconds";
    pub const TERM_CORRECTIONS_TOTAL: &str = "vbatch_term_corrections_total";
}

/// Record a finished item.
pub fn record_item(pipeline: Pipeline, status: ItemStatus, duration_secs: f64) {
    let labels = [
        ("pipeline", pipeline.as_str().to_string()),
        ("status", status.as_str().to_string()),
    ];
    counter!(names::ITEMS_TOTAL, &labels).increment(1);
    histogram!(names::ITEM_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a retry at `layer` ("client" or "item").
pub fn record_retry(layer: &str) {
    let labels = [("layer", layer.to_string())];
    counter!(names::RETRIES_TOTAL, &labels).increment(1);
}

/// Record a quality gate verdict.
pub fn record_quality(pipeline: Pipeline, passed: bool) {
    let labels = [
        ("pipeline", pipeline.as_str().to_string()),
        ("passed", passed.to_string()),
    ];
    counter!(names::QUALITY_CHECKS_TOTAL, &labels).increment(1);
}

/// Record transcript segments whose text was corrected.
pub fn record_term_corrections(segments: usize) {
    counter!(names::TERM_CORRECTIONS_TOTAL).increment(segments as u64);
}

pub fn set_items_in_flight(count: usize) {
    gauge!(names::ITEMS_IN_FLIGHT).set(count as f64);
}

pub fn record_batch(pipeline: Pipeline, wall_clock_secs: f64) {
    let labels = [("pipeline", pipeline.as_str().to_string())];
    histogram!(names::BATCH_DURATION_SECONDS, &labels).record(wall_clock_secs);
}
