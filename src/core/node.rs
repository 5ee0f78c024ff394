//! Nodes: named units of work in the pipeline graph.

use async_trait::async_trait;

use super::state::{Field, PipelineState, StatePatch};
use crate::domain::PipelineError;

/// Node names are fixed at graph construction
pub type NodeId = &'static str;

/// A named wrapper around one opaque step call.
///
/// A node reads what it needs from the current snapshot and returns a patch
/// naming only fields it owns. Side effects (network, subprocess, files) are
/// allowed but must be visible through the patch.
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique name within the graph
    fn name(&self) -> NodeId;

    /// Fields this node may write
    fn owned_fields(&self) -> &'static [Field];

    /// Run against a snapshot and return the fields to overwrite
    async fn run(&self, state: &PipelineState) -> StatePatch;

    /// Patch recorded when the node could not produce one itself
    /// (its task panicked or was aborted)
    fn failure_patch(&self, _state: &PipelineState, reason: String) -> StatePatch {
        StatePatch::empty().with_error(PipelineError::Step {
            node: self.name().to_string(),
            reason,
        })
    }
}
