use thiserror::Error;

use crate::collaborators::{GenerationError, PublishError};
use crate::item::{ItemState, Stage};
use crate::quality::ImprovementHint;

fn join_hints(hints: &[ImprovementHint]) -> String {
    hints
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("External call failed: {0}")]
    TransientExternal(#[from] GenerationError),

    #[error("Malformed model response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Quality gate failed after {attempts} attempts: {}", join_hints(.gaps))]
    QualityGateFailure {
        attempts: u32,
        gaps: Vec<ImprovementHint>,
    },

    #[error("Personal data detected in draft: {}", .findings.join(", "))]
    PrivacyLeakDetected { findings: Vec<String> },

    #[error("Illegal transition for item {item_id}: {from} -> {to}")]
    StateGuardViolation {
        item_id: String,
        from: ItemState,
        to: ItemState,
    },

    #[error("Item {0} already has an active pipeline run")]
    AlreadyInFlight(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Item {item_id} has no output for the {stage} stage")]
    MissingInput { item_id: String, stage: Stage },

    #[error("Publishing failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl PipelineError {
    /// Whether another generation attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientExternal(_) | PipelineError::MalformedResponse { .. }
        )
    }

    /// Programming or operational errors that must not mark the item failed.
    pub fn is_guard_violation(&self) -> bool {
        matches!(
            self,
            PipelineError::StateGuardViolation { .. } | PipelineError::AlreadyInFlight(_)
        )
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        PipelineError::MalformedResponse {
            reason: reason.into(),
        }
    }
}
