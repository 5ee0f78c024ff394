//! animathics - Retrying, branching pipeline orchestrator for narrated
//! math animations
//!
//! A topic goes in, a narrated video comes out. The work is a small graph
//! of async nodes driven by an executor:
//!
//! ```text
//! generate -> align -> persist -> test -> router
//!   pass              -> {render, audio} -> merge
//!   fail, budget left -> repair -> persist
//!   otherwise         -> end
//! ```
//!
//! # Architecture
//!
//! - Nodes read an immutable snapshot and return a typed partial update
//! - Failures are recorded in the state, never thrown past a node
//! - Every run is journaled as JSONL events and can be summarized later
//!
//! # Modules
//!
//! - `adapters`: External integrations (Gemini, ElevenLabs, python, manim, ffmpeg)
//! - `cache`: Result cache keyed by the normalized prompt
//! - `core`: State, graph, router, executor and run journal
//! - `domain`: Data structures (PipelineError, Event, Run)
//! - `pipeline`: The concrete nodes and graph wiring
//! - `storage`: Atomic file placement
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Generate a video
//! animathics generate "pythagorean theorem"
//!
//! # Check run status
//! animathics status <run-id>
//! ```

pub mod adapters;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod pipeline;
pub mod storage;

// Re-export main types at crate root for convenience
pub use crate::core::{Executor, FinalState, PipelineState, StatePatch};
pub use crate::domain::{Event, EventType, PipelineError, Run, RunState};
pub use crate::pipeline::{run_pipeline, Dependencies, PipelineOutcome};
