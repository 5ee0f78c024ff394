//! Routing decisions taken after designated decision nodes.
//!
//! A router is a pure, total function from the current snapshot to the next
//! destination. It is the only place where control flow branches on errors.

use super::node::NodeId;
use super::state::PipelineState;

/// Maximum number of repair cycles before the run ends
pub const MAX_RETRIES: u32 = 2;

/// Where the executor goes after a decision node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Continue with one node
    Single(NodeId),

    /// Fan out into branches that run concurrently and join afterwards
    Parallel(Vec<NodeId>),

    /// Stop and hand the current state back
    Terminal,
}

/// A routing function attached to a decision node
pub trait Route: Send + Sync {
    fn route(&self, state: &PipelineState) -> Next;
}

impl<F> Route for F
where
    F: Fn(&PipelineState) -> Next + Send + Sync,
{
    fn route(&self, state: &PipelineState) -> Next {
        self(state)
    }
}

/// Router for the compile-check decision point.
///
/// 1. success flag set -> `success`
/// 2. error + artifact + budget left -> `repair`
/// 3. anything else -> terminal
#[derive(Debug, Clone)]
pub struct RetryRouter {
    /// Destination when the check passed
    pub success: Next,

    /// Node that repairs a failed artifact
    pub repair: NodeId,

    /// Repair cycles allowed
    pub max_retries: u32,
}

impl RetryRouter {
    pub fn new(success: Next, repair: NodeId) -> Self {
        Self {
            success,
            repair,
            max_retries: MAX_RETRIES,
        }
    }

    /// Whether a failed state can still be repaired
    pub fn can_repair(&self, state: &PipelineState) -> bool {
        state.error.is_some() && state.artifact.is_some() && state.retries < self.max_retries
    }
}

impl Route for RetryRouter {
    fn route(&self, state: &PipelineState) -> Next {
        if state.test_passed {
            return self.success.clone();
        }

        if self.can_repair(state) {
            return Next::Single(self.repair);
        }

        Next::Terminal
    }
}
