//! Item pipelines.
//!
//! An [`ItemPipeline`] runs one attempt at one input and returns its
//! outcome. Errors end the attempt; the orchestrator decides whether to
//! retry or to record a failure through [`ItemPipeline::finalize_failure`].

pub mod manifest;
pub mod slice;
pub mod transcribe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vbatch_models::{InputItem, ItemOutcome, ItemState, Pipeline};

use crate::error::{WorkerError, WorkerResult};

pub use manifest::{manifest_path, ItemManifest};
pub use slice::SlicePipeline;
pub use transcribe::TranscribePipeline;

/// One processing attempt for a single input.
#[async_trait]
pub trait ItemPipeline: Send + Sync {
    fn pipeline(&self) -> Pipeline;

    /// Process `item`, recording every state change in `trail`.
    ///
    /// On `Ok` the terminal manifest has already been written.
    async fn process(&self, item: &InputItem, trail: &mut StateTrail) -> WorkerResult<ItemOutcome>;

    /// Write the manifest for an item that ended in `Failed`.
    async fn finalize_failure(&self, item: &InputItem, outcome: &ItemOutcome, trail: &StateTrail) -> WorkerResult<()>;
}

/// A state entered by an item, with the time it was entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub state: ItemState,
    pub at: DateTime<Utc>,
}

/// The states one attempt moved through, starting at `Pending`.
#[derive(Debug, Clone)]
pub struct StateTrail {
    item_id: String,
    changes: Vec<StateChange>,
}

impl StateTrail {
    pub fn new(item_id: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            changes: vec![StateChange {
                state: ItemState::Pending,
                at: Utc::now(),
            }],
        }
    }

    pub fn current(&self) -> ItemState {
        self.changes
            .last()
            .map(|c| c.state)
            .unwrap_or_default()
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn advance(&mut self, next: ItemState) -> WorkerResult<()> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(WorkerError::IllegalTransition { from, to: next });
        }
        debug!(item_id = %self.item_id, from = %from, to = %next, "State transition");
        self.changes.push(StateChange {
            state: next,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Move to `Failed` unless already terminal.
    pub fn fail(&mut self) {
        if !self.current().is_terminal() {
            self.changes.push(StateChange {
                state: ItemState::Failed,
                at: Utc::now(),
            });
        }
    }

    pub fn changes(&self) -> &[StateChange] {
        &self.changes
    }

    pub fn states(&self) -> Vec<ItemState> {
        self.changes.iter().map(|c| c.state).collect()
    }
}
