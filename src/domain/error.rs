//! Failure taxonomy carried in pipeline state.
//!
//! Node-local failures never escape a node; they are recorded in the
//! state's `error` field as one of these variants and the router decides
//! what happens next.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message recorded when the compile check fails with no retry budget left
pub const EXHAUSTED_MESSAGE: &str = "Max retries reached during test";

/// A failure recorded in the pipeline state
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PipelineError {
    /// The generator produced no usable artifact (nothing to repair)
    #[error("{reason}")]
    Generation { reason: String },

    /// The artifact failed the compile check (retryable)
    #[error("Compile check failed: {reason}")]
    Validation { reason: String },

    /// Retry budget spent; keeps the last compile error for diagnostics
    #[error("Max retries reached during test")]
    Exhausted { last_error: String },

    /// A fan-out branch failed
    #[error("Branch '{branch}' failed: {reason}")]
    Branch { branch: String, reason: String },

    /// The merge node ran without both upstream artifacts
    #[error("Join precondition failed: missing {missing}")]
    JoinPrecondition { missing: String },

    /// Any other node-local failure
    #[error("Node '{node}' failed: {reason}")]
    Step { node: String, reason: String },

    /// The executor's node-visit budget was spent
    #[error("Execution limit reached: {reason}")]
    LimitExceeded { reason: String },
}

impl PipelineError {
    /// Short machine-friendly label used in journal entries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation { .. } => "generation",
            Self::Validation { .. } => "validation",
            Self::Exhausted { .. } => "exhausted",
            Self::Branch { .. } => "branch",
            Self::JoinPrecondition { .. } => "join_precondition",
            Self::Step { .. } => "step",
            Self::LimitExceeded { .. } => "limit_exceeded",
        }
    }
}
