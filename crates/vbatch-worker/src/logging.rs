//! Structured item logging utilities.
//!
//! Provides consistent lifecycle messages for one batch item with the
//! item id and pipeline attached as fields.

use tracing::{error, info, warn, Span};
use vbatch_models::{ItemState, Pipeline};

/// Item logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct ItemLogger {
    item_id: String,
    pipeline: Pipeline,
}

impl ItemLogger {
    pub fn new(item_id: &str, pipeline: Pipeline) -> Self {
        Self {
            item_id: item_id.to_string(),
            pipeline,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            pipeline = %self.pipeline,
            "Item started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            pipeline = %self.pipeline,
            "Item progress: {}", message
        );
    }

    pub fn log_transition(&self, from: ItemState, to: ItemState) {
        info!(
            item_id = %self.item_id,
            pipeline = %self.pipeline,
            from = %from,
            to = %to,
            "Item state changed"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            item_id = %self.item_id,
            pipeline = %self.pipeline,
            "Item warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            item_id = %self.item_id,
            pipeline = %self.pipeline,
            "Item error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            item_id = %self.item_id,
            pipeline = %self.pipeline,
            "Item completed: {}", message
        );
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    /// Span covering all attempts of one item.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "item",
            item_id = %self.item_id,
            pipeline = %self.pipeline
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_logger_creation() {
        let logger = ItemLogger::new("clip_01", Pipeline::Transcribe);

        assert_eq!(logger.item_id(), "clip_01");
        assert_eq!(logger.pipeline(), Pipeline::Transcribe);
    }
}
