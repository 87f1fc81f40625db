//! Remote analysis clients.
//!
//! This crate provides:
//! - The [`AnalysisClient`] seam used by the item pipelines
//! - Polling and transient-retry helpers shared by the adapters
//! - A Google Video Intelligence adapter (shots and labels)
//! - A DashScope adapter (speech transcription)

pub mod client;
pub mod error;
pub mod transcription;
pub mod types;
pub mod video_intelligence;

pub use client::{
    poll_until, transient_retry_policy, AnalysisClient, AnalysisOutput, PollConfig, PollStatus,
};
pub use error::{AnalysisError, AnalysisResult};
pub use transcription::{DashScopeClient, TranscriptionConfig};
pub use video_intelligence::{VideoIntelligenceClient, VideoIntelligenceConfig};
