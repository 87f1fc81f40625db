//! Shared data models for the vbatch pipelines.
//!
//! This crate provides Serde-serializable types for:
//! - Input items and their media kind
//! - Time ranges, extraction results and transcript segments
//! - Quality reports, item outcomes and batch reports
//! - Encoding configuration
//! - The retry policy shared by the remote client and the orchestrator

pub mod encoding;
pub mod error;
pub mod extraction;
pub mod feature;
pub mod media;
pub mod outcome;
pub mod quality;
pub mod range;
pub mod report;
pub mod retry;
pub mod state;
pub mod timestamp;
pub mod transcript;

// Re-export common types
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use extraction::ExtractionResult;
pub use feature::{Feature, Pipeline};
pub use media::{InputItem, MediaKind};
pub use outcome::{Artifacts, ItemOutcome, ItemStatus};
pub use quality::{DurationStats, QualityIssues, QualityReport, Rejection};
pub use range::{LabelAnnotation, TimeRange};
pub use report::{time_saved_ratio, BatchReport, ConcurrencyInfo};
pub use retry::{retry_async, Backoff, RetryOutcome, RetryPolicy};
pub use state::ItemState;
pub use transcript::{RawTranscriptSegment, TranscriptSegment};
