//! Batch orchestration for the slice and transcribe pipelines.
//!
//! This crate provides:
//! - Input discovery and the bounded-concurrency batch orchestrator
//! - The slice and transcribe item pipelines with their state trail
//! - Quality gates for slices and transcripts
//! - Professional term correction for accepted transcripts
//! - Streaming report aggregation
//! - Structured item logging and metrics

pub mod config;
pub mod discovery;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod terms;

pub use config::WorkerConfig;
pub use discovery::discover_inputs;
pub use error::{WorkerError, WorkerResult};
pub use logging::ItemLogger;
pub use orchestrator::{item_retry_policy, AttemptError, BatchOrchestrator};
pub use pipeline::{ItemPipeline, SlicePipeline, StateTrail, TranscribePipeline};
pub use quality::{GateCheck, GateThresholds, SliceQualityPolicy, TranscriptQualityPolicy};
pub use report::ReportWriter;
pub use terms::TermCorrector;
