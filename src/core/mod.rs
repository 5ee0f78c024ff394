//! Core orchestration logic.
//!
//! This module contains:
//! - State: typed pipeline state and partial updates
//! - Node / Router / Graph: the static shape of a pipeline
//! - Executor: walks a graph, forks and joins branches, bounds retries
//! - EventStore: append-only run journal
//! - Limits: visit budget and artifact size cap

pub mod event_store;
pub mod executor;
pub mod graph;
pub mod limits;
pub mod node;
pub mod router;
pub mod state;
pub mod step;

// Re-export commonly used types
pub use event_store::EventStore;
pub use executor::{Executor, Phase};
pub use graph::{Edge, Graph, GraphBuilder, GraphError, Join};
pub use limits::{ExecutionLimits, LimitViolation, VisitTracker};
pub use node::{Node, NodeId};
pub use router::{Next, RetryRouter, Route, MAX_RETRIES};
pub use state::{ErrorUpdate, Field, FinalState, PipelineState, StatePatch};
pub use step::{invoke, StepFailure, StepResult};
