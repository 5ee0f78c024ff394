//! Execution limits enforced by the executor.
//!
//! Prevents runaway execution through:
//! - A node-visit budget tied to the graph size and the retry budget
//! - A size cap on generated artifacts before they are persisted

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::graph::Graph;
use super::router::MAX_RETRIES;

/// Limits for one pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Maximum node invocations per run
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: u32,

    /// Maximum size of a generated artifact in bytes (default: 1MB)
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,
}

fn default_max_node_visits() -> u32 {
    64
}
fn default_max_artifact_bytes() -> u64 {
    1024 * 1024
} // 1MB

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_node_visits: default_max_node_visits(),
            max_artifact_bytes: default_max_artifact_bytes(),
        }
    }
}

impl ExecutionLimits {
    /// Visit budget derived from the graph: every node may run once per attempt
    pub fn for_graph(graph: &Graph) -> Self {
        Self {
            max_node_visits: graph.node_count() as u32 * (MAX_RETRIES + 1),
            ..Default::default()
        }
    }

    /// Check the tracker before another node visit
    pub fn check(&self, tracker: &VisitTracker) -> Result<(), LimitViolation> {
        self.check_batch(tracker, 1)
    }

    /// Check the tracker before `count` visits that start together, as a
    /// fan-out does. All of them must fit in the remaining budget.
    pub fn check_batch(&self, tracker: &VisitTracker, count: u32) -> Result<(), LimitViolation> {
        let requested = tracker.visits.saturating_add(count);
        if requested > self.max_node_visits {
            return Err(LimitViolation::MaxNodeVisits {
                requested,
                limit: self.max_node_visits,
            });
        }
        Ok(())
    }

    /// Validate a generated artifact against the size cap
    pub fn validate_artifact(&self, artifact: &str) -> Result<(), LimitViolation> {
        let size = artifact.len() as u64;
        if size > self.max_artifact_bytes {
            return Err(LimitViolation::MaxArtifactBytes {
                actual: size,
                limit: self.max_artifact_bytes,
            });
        }
        Ok(())
    }
}

/// Tracks node visits during a run
#[derive(Debug, Clone)]
pub struct VisitTracker {
    /// Number of node invocations so far (fan-out branches count each)
    pub visits: u32,

    /// When the run started
    pub started_at: Instant,
}

impl Default for VisitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitTracker {
    pub fn new() -> Self {
        Self {
            visits: 0,
            started_at: Instant::now(),
        }
    }

    /// Record node invocations
    pub fn record(&mut self, count: u32) {
        self.visits += count;
    }

    /// Elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// Limit violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitViolation {
    #[error("Maximum node visits exceeded: {requested} > {limit}")]
    MaxNodeVisits { requested: u32, limit: u32 },

    #[error("Maximum artifact bytes exceeded: {actual} > {limit}")]
    MaxArtifactBytes { actual: u64, limit: u64 },
}
