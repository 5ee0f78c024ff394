//! Append-only run journal with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy debugging/inspection, one directory per run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Event, EventType, Run};

/// File-based event store using JSONL format
#[derive(Debug, Clone)]
pub struct EventStore {
    /// Run this journal belongs to
    run_id: Uuid,

    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl EventStore {
    /// Create or open the journal of a run under `runs_dir`
    pub async fn open_in(runs_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = runs_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let events_path = run_dir.join("events.jsonl");

        Ok(Self {
            run_id,
            run_dir,
            events_path,
        })
    }

    /// The run this journal belongs to
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Get the run directory
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open events file: {}",
                    self.events_path.display()
                )
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Replay the journal into a run summary
    pub async fn summary(&self) -> Result<Option<Run>> {
        let events = self.replay().await?;
        Ok(Run::from_events(&events))
    }

    /// Find events matching a predicate
    pub async fn find_events<F>(&self, predicate: F) -> Result<Vec<Event>>
    where
        F: Fn(&Event) -> bool,
    {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(predicate).collect())
    }

    /// Get the last event of a specific type
    pub async fn last_event_of_type(&self, event_type: EventType) -> Result<Option<Event>> {
        let events = self.replay().await?;
        Ok(events.into_iter().rev().find(|e| e.event_type == event_type))
    }

    /// List all run IDs in `runs_dir`
    pub async fn list_runs(runs_dir: &Path) -> Result<Vec<Uuid>> {
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(runs_dir)
            .await
            .with_context(|| format!("Failed to read runs directory: {}", runs_dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}
