//! Domain types for the animathics orchestrator.
//!
//! This module contains the core data structures:
//! - Error: Failure taxonomy recorded in pipeline state
//! - Events: Journal entries written while a run executes
//! - Run: Run summaries reconstructed from the journal

pub mod error;
pub mod events;
pub mod run;

// Re-export commonly used types
pub use error::{PipelineError, EXHAUSTED_MESSAGE};
pub use events::{Event, EventType, NodeStatus};
pub use run::{Run, RunState};
