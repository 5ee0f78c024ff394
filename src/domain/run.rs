//! Run summaries reconstructed from journal events.
//!
//! A Run describes one pipeline invocation after the fact: which nodes ran,
//! how many repair cycles happened and how it ended.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventType, NodeStatus};

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Summary line of the run-start event (contains the prompt)
    pub description: String,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if applicable)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of node invocations observed
    pub node_visits: u32,

    /// Number of repair cycles scheduled by the router
    pub retries: u32,

    /// Whether the result came from the cache
    pub cached: bool,

    /// Last status of each node (node name -> status)
    pub node_statuses: HashMap<String, NodeStatus>,
}

impl Run {
    /// Create a fresh summary for a run that just started
    pub fn new(id: Uuid, description: String) -> Self {
        Self {
            id,
            description,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            node_visits: 0,
            retries: 0,
            cached: false,
            node_statuses: HashMap::new(),
        }
    }

    /// Reconstruct a run summary from a sequence of events
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self::new(first_event.run_id, String::new());
        run.started_at = first_event.timestamp;

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update the summary
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.state = RunState::Running;
                self.started_at = event.timestamp;
                self.description = event.summary.clone();
            }
            EventType::RunCompleted => {
                self.state = RunState::Completed;
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                self.state = RunState::Failed {
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::CacheHit => {
                self.cached = true;
            }
            EventType::NodeStarted => {
                if let Some(ref node) = event.node {
                    self.node_visits += 1;
                    self.node_statuses.insert(node.clone(), NodeStatus::Running);
                }
            }
            EventType::NodeCompleted | EventType::NodeFailed => {
                if let Some(ref node) = event.node {
                    self.node_statuses.insert(node.clone(), event.status);
                }
            }
            EventType::RetryScheduled => {
                self.retries += 1;
            }
            EventType::LimitReached => {
                self.state = RunState::LimitReached {
                    limit: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::BranchesForked | EventType::BranchesJoined => {}
        }
    }

    /// Check if the run is still in progress
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    /// Check if a specific node last finished successfully
    pub fn is_node_completed(&self, node: &str) -> bool {
        self.node_statuses
            .get(node)
            .map(|s| *s == NodeStatus::Completed)
            .unwrap_or(false)
    }
}

/// State of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Currently executing
    Running,

    /// Finished with a merged result
    Completed,

    /// Finished with an error in the final state
    Failed { error: String },

    /// Stopped by the executor's visit budget
    LimitReached { limit: String },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Running
    }
}
