//! Item processing state machine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::outcome::ItemStatus;

/// States an item moves through while being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    Pending,
    Analyzing,
    FallbackGenerating,
    Extracting,
    QualityChecking,
    Accepted,
    Rejected,
    Failed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::Analyzing => "analyzing",
            ItemState::FallbackGenerating => "fallback_generating",
            ItemState::Extracting => "extracting",
            ItemState::QualityChecking => "quality_checking",
            ItemState::Accepted => "accepted",
            ItemState::Rejected => "rejected",
            ItemState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Accepted | ItemState::Rejected | ItemState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: ItemState) -> bool {
        use ItemState::*;
        match (self, next) {
            (_, Failed) => !self.is_terminal(),
            (Pending, Analyzing) => true,
            (Analyzing, FallbackGenerating | Extracting | QualityChecking) => true,
            (FallbackGenerating, Extracting) => true,
            (Extracting, QualityChecking) => true,
            (QualityChecking, Accepted | Rejected) => true,
            _ => false,
        }
    }

    /// Terminal item status for a terminal state.
    pub fn status(&self) -> Option<ItemStatus> {
        match self {
            ItemState::Accepted => Some(ItemStatus::Success),
            ItemState::Rejected => Some(ItemStatus::QualityRejected),
            ItemState::Failed => Some(ItemStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
