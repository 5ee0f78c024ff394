//! Journal events recorded while a pipeline run executes.
//!
//! Every phase change of the executor is appended to the run's journal as
//! one of these events. The journal is observational: the executor never
//! reads it back while running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in a run's append-only journal.
///
/// Replaying a journal in order reconstructs a [`super::Run`] summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Node the event refers to (if applicable)
    pub node: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (NO secrets, NO generated content)
    pub summary: String,

    /// Status of the node/run after this event
    pub status: NodeStatus,

    /// Time taken in milliseconds (for finished nodes)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        node: Option<String>,
        event_type: EventType,
        summary: String,
        status: NodeStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            node,
            event_type,
            summary,
            status,
            duration_ms: None,
            error: None,
        }
    }

    /// Attach duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of events that can occur during pipeline execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// A run ended with no error in its final state
    RunCompleted,

    /// A run ended with an error in its final state
    RunFailed,

    /// The result was served from the cache without executing the graph
    CacheHit,

    /// A node has started execution
    NodeStarted,

    /// A node returned a patch without recording a new error
    NodeCompleted,

    /// A node recorded an error in its patch
    NodeFailed,

    /// Fan-out branches were spawned from a shared snapshot
    BranchesForked,

    /// All fan-out branches finished and their patches were merged
    BranchesJoined,

    /// The router sent the run back through the repair loop
    RetryScheduled,

    /// The executor's visit budget was exhausted
    LimitReached,
}

/// Status of a node or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet started
    Pending,

    /// Currently executing
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,

    /// Short-circuited by a sticky error
    Skipped,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Pending
    }
}
