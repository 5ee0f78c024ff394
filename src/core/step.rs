//! The uniform result shape of every opaque step call.
//!
//! Adapters speak `anyhow::Result`. Nodes call them through [`invoke`],
//! which turns every failure (transport, parsing, subprocess exit) into a
//! [`StepFailure`] so nothing propagates past the node boundary.

use std::future::Future;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, warn};

/// Why an opaque step call failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{step}: {reason}")]
pub struct StepFailure {
    /// Name of the call that failed
    pub step: &'static str,

    /// Flattened error chain
    pub reason: String,
}

impl StepFailure {
    pub fn new(step: &'static str, reason: impl Into<String>) -> Self {
        Self {
            step,
            reason: reason.into(),
        }
    }
}

/// `Ok(payload)` or `Err(reason)` for one opaque call
pub type StepResult<T> = Result<T, StepFailure>;

/// Await one opaque call and capture its outcome as a [`StepResult`]
pub async fn invoke<T, F>(step: &'static str, call: F) -> StepResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let started = Instant::now();
    let result = call.await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(value) => {
            debug!(step, elapsed_ms, "Step call succeeded");
            Ok(value)
        }
        Err(e) => {
            // {:#} keeps the whole context chain on one line
            let reason = format!("{:#}", e);
            warn!(step, elapsed_ms, error = %reason, "Step call failed");
            Err(StepFailure::new(step, reason))
        }
    }
}
