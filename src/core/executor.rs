//! Graph executor: walks the pipeline graph from its entry node.
//!
//! Coordinates node invocation, patch merging, routing, fan-out/join,
//! journaling and the visit budget. The executor never fails: every node
//! runs on its own task, a panicking node becomes its failure patch, and
//! the caller gets the final merged state back and inspects its `error`
//! field.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Event, EventType, NodeStatus, PipelineError};

use super::event_store::EventStore;
use super::graph::{Edge, Graph};
use super::limits::{ExecutionLimits, LimitViolation, VisitTracker};
use super::node::{Node, NodeId};
use super::router::Next;
use super::state::{PipelineState, StatePatch};

/// Where the executor is in its walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// About to run a node (budget not yet checked)
    Pending(NodeId),

    /// Running a node against the current snapshot
    Running(NodeId),

    /// Fan-out branches to spawn and wait for
    AwaitingJoin(Vec<NodeId>),

    /// Done; the current snapshot is final
    Terminal,
}

/// Drives one graph over pipeline states
pub struct Executor {
    graph: Arc<Graph>,
    limits: ExecutionLimits,
    journal: Option<EventStore>,
}

impl Executor {
    /// Create an executor with a visit budget derived from the graph
    pub fn new(graph: Arc<Graph>) -> Self {
        let limits = ExecutionLimits::for_graph(&graph);
        Self {
            graph,
            limits,
            journal: None,
        }
    }

    /// Override the execution limits
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Journal every phase change into `journal`
    pub fn with_journal(mut self, journal: EventStore) -> Self {
        self.journal = Some(journal);
        self
    }

    /// The graph being executed
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The limits in force
    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Run the graph from its entry node until a terminal condition
    #[instrument(skip(self, initial), fields(run_id = %self.run_id(), prompt = %initial.prompt))]
    pub async fn run(&self, initial: PipelineState) -> PipelineState {
        info!("Starting pipeline execution");

        self.record(Event::new(
            self.run_id(),
            None,
            EventType::RunStarted,
            format!("Pipeline started for '{}'", initial.prompt),
            NodeStatus::Running,
        ))
        .await;

        let mut state = initial;
        let mut tracker = VisitTracker::new();
        let mut phase = Phase::Pending(self.graph.entry());

        loop {
            phase = match phase {
                Phase::Pending(name) => match self.limits.check(&tracker) {
                    Ok(()) => Phase::Running(name),
                    Err(violation) => {
                        state = self.halt_on_limit(state, violation).await;
                        Phase::Terminal
                    }
                },

                Phase::Running(name) => match self.graph.node(name).cloned() {
                    Some(node) => {
                        tracker.record(1);
                        let patch = self.run_node(&node, &state).await;
                        state = state.merge(&patch);
                        self.advance(name, &state).await
                    }
                    None => {
                        error!(node = name, "Router sent execution to an unknown node");
                        state = state.merge(&unknown_node(name));
                        Phase::Terminal
                    }
                },

                Phase::AwaitingJoin(branches) => {
                    let batch = branches.len() as u32;
                    if let Err(violation) = self.limits.check_batch(&tracker, batch) {
                        state = self.halt_on_limit(state, violation).await;
                        Phase::Terminal
                    } else {
                        match self.graph.convergence(&branches) {
                            Ok(into) => {
                                tracker.record(batch);
                                state = self.fork_join(&branches, state).await;
                                Phase::Pending(into)
                            }
                            Err(e) => {
                                error!(error = %e, "Fan-out branches cannot be joined");
                                state = state.merge(&StatePatch::empty().with_error(
                                    PipelineError::Step {
                                        node: "join".to_string(),
                                        reason: e.to_string(),
                                    },
                                ));
                                Phase::Terminal
                            }
                        }
                    }
                }

                Phase::Terminal => break,
            };
        }

        self.finish(&state, &tracker).await;
        state
    }

    /// Decide the phase after `name` finished
    async fn advance(&self, name: NodeId, state: &PipelineState) -> Phase {
        match self.graph.edge(name) {
            None => Phase::Terminal,

            Some(Edge::Static(to)) => Phase::Pending(*to),

            Some(&Edge::Back { to, label }) => {
                info!(from = name, to, label, retries = state.retries, "Following back edge");
                self.record(Event::new(
                    self.run_id(),
                    Some(name.to_string()),
                    EventType::RetryScheduled,
                    format!("Back edge '{}' to '{}' (retries = {})", label, to, state.retries),
                    NodeStatus::Running,
                ))
                .await;
                Phase::Pending(to)
            }

            Some(Edge::Routed(router)) => match router.route(state) {
                Next::Single(to) => {
                    debug!(from = name, to, "Router picked single destination");
                    Phase::Pending(to)
                }
                Next::Parallel(branches) if branches.is_empty() => Phase::Terminal,
                Next::Parallel(branches) => {
                    debug!(from = name, ?branches, "Router picked fan-out");
                    Phase::AwaitingJoin(branches)
                }
                Next::Terminal => {
                    debug!(from = name, "Router picked terminal");
                    Phase::Terminal
                }
            },
        }
    }

    /// Invoke one node on the current snapshot and journal the outcome
    async fn run_node(&self, node: &Arc<dyn Node>, state: &PipelineState) -> StatePatch {
        let name = node.name();
        debug!(node = name, "Running node");
        self.record_started(name).await;

        let started = Instant::now();
        let snapshot = Arc::new(state.clone());
        let handle = spawn_node(Arc::clone(node), snapshot);
        let patch = match handle.await {
            Ok(patch) => patch,
            Err(e) => {
                error!(node = name, error = %e, "Node task did not complete");
                node.failure_patch(state, format!("node task failed: {}", e))
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        self.record_finished(name, state, &patch, duration_ms).await;
        patch
    }

    /// Run every branch concurrently on one snapshot, wait for all, merge in
    /// declaration order
    async fn fork_join(&self, branches: &[NodeId], state: PipelineState) -> PipelineState {
        let snapshot = Arc::new(state);

        self.record(Event::new(
            self.run_id(),
            None,
            EventType::BranchesForked,
            format!("Forked {}", branches.join(", ")),
            NodeStatus::Running,
        ))
        .await;

        let mut tasks = Vec::with_capacity(branches.len());
        for &name in branches {
            let Some(node) = self.graph.node(name).cloned() else {
                continue;
            };
            self.record_started(name).await;

            let handle = spawn_node(Arc::clone(&node), Arc::clone(&snapshot));
            tasks.push((node, Instant::now(), handle));
        }

        // Barrier: every branch runs to completion, failures included
        let mut patches = Vec::with_capacity(tasks.len());
        for (node, started, handle) in tasks {
            let patch = match handle.await {
                Ok(patch) => patch,
                Err(e) => {
                    error!(node = node.name(), error = %e, "Branch task did not complete");
                    node.failure_patch(&snapshot, format!("branch task failed: {}", e))
                }
            };
            let duration_ms = started.elapsed().as_millis() as u64;
            self.record_finished(node.name(), &snapshot, &patch, duration_ms).await;
            patches.push((node, patch));
        }

        let mut merged = (*snapshot).clone();
        for (node, patch) in &patches {
            for field in patch.touched_fields() {
                if !node.owned_fields().contains(&field) {
                    warn!(node = node.name(), %field, "Branch wrote a field it does not own");
                }
            }
            merged = merged.merge(patch);
        }

        self.record(Event::new(
            self.run_id(),
            None,
            EventType::BranchesJoined,
            format!("Joined {}", branches.join(", ")),
            NodeStatus::Completed,
        ))
        .await;

        merged
    }

    /// Stop the run because the visit budget is spent
    async fn halt_on_limit(&self, state: PipelineState, violation: LimitViolation) -> PipelineState {
        let reason = violation.to_string();
        error!(%reason, "Execution limit reached");

        self.record(
            Event::new(
                self.run_id(),
                None,
                EventType::LimitReached,
                format!("Execution limit reached: {}", reason),
                NodeStatus::Failed,
            )
            .with_error(reason.clone()),
        )
        .await;

        state.merge(&StatePatch::empty().with_error(PipelineError::LimitExceeded { reason }))
    }

    /// Journal the final outcome
    async fn finish(&self, state: &PipelineState, tracker: &VisitTracker) {
        let elapsed_ms = tracker.elapsed_ms();

        match &state.error {
            None => {
                info!(
                    visits = tracker.visits,
                    retries = state.retries,
                    elapsed_ms,
                    "Pipeline finished"
                );
                self.record(
                    Event::new(
                        self.run_id(),
                        None,
                        EventType::RunCompleted,
                        "Pipeline finished".to_string(),
                        NodeStatus::Completed,
                    )
                    .with_duration(elapsed_ms),
                )
                .await;
            }
            // Already journaled by halt_on_limit
            Some(PipelineError::LimitExceeded { .. }) => {}
            Some(e) => {
                warn!(
                    visits = tracker.visits,
                    retries = state.retries,
                    elapsed_ms,
                    error = %e,
                    "Pipeline finished with error"
                );
                self.record(
                    Event::new(
                        self.run_id(),
                        None,
                        EventType::RunFailed,
                        format!("Pipeline failed ({})", e.kind()),
                        NodeStatus::Failed,
                    )
                    .with_duration(elapsed_ms)
                    .with_error(e.to_string()),
                )
                .await;
            }
        }
    }

    async fn record_started(&self, name: NodeId) {
        self.record(Event::new(
            self.run_id(),
            Some(name.to_string()),
            EventType::NodeStarted,
            format!("Node '{}' started", name),
            NodeStatus::Running,
        ))
        .await;
    }

    async fn record_finished(
        &self,
        name: NodeId,
        before: &PipelineState,
        patch: &StatePatch,
        duration_ms: u64,
    ) {
        let event = if let Some(reason) = patch.failure_reason() {
            warn!(node = name, duration_ms, error = %reason, "Node failed");
            Event::new(
                self.run_id(),
                Some(name.to_string()),
                EventType::NodeFailed,
                format!("Node '{}' failed in {}ms", name, duration_ms),
                NodeStatus::Failed,
            )
            .with_error(reason)
        } else if patch.is_empty() && before.has_error() {
            debug!(node = name, "Node short-circuited on sticky error");
            Event::new(
                self.run_id(),
                Some(name.to_string()),
                EventType::NodeCompleted,
                format!("Node '{}' skipped (upstream error)", name),
                NodeStatus::Skipped,
            )
        } else {
            debug!(node = name, duration_ms, "Node completed");
            Event::new(
                self.run_id(),
                Some(name.to_string()),
                EventType::NodeCompleted,
                format!("Node '{}' completed in {}ms", name, duration_ms),
                NodeStatus::Completed,
            )
        };

        self.record(event.with_duration(duration_ms)).await;
    }

    /// Append to the journal; journal failures never abort a run
    async fn record(&self, event: Event) {
        if let Some(ref journal) = self.journal {
            if let Err(e) = journal.append(&event).await {
                warn!(error = %e, event = ?event.event_type, "Failed to journal event");
            }
        }
    }

    fn run_id(&self) -> Uuid {
        self.journal
            .as_ref()
            .map(EventStore::run_id)
            .unwrap_or_else(Uuid::nil)
    }
}

/// Run a node on its own task so a panic surfaces as a `JoinError`
fn spawn_node(node: Arc<dyn Node>, snapshot: Arc<PipelineState>) -> JoinHandle<StatePatch> {
    tokio::spawn(async move { node.run(&snapshot).await })
}

fn unknown_node(name: NodeId) -> StatePatch {
    StatePatch::empty().with_error(PipelineError::Step {
        node: name.to_string(),
        reason: "no such node in graph".to_string(),
    })
}
