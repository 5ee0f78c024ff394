//! Result cache for successful pipeline runs.
//!
//! Keyed by the SHA-256 of the normalized prompt. A hit is only served when
//! the cached media files still exist on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::PipelineState;

/// Cache key: hex SHA-256 of a normalized prompt
pub fn fingerprint(normalized_prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// What a successful run leaves behind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResult {
    pub prompt: String,
    pub artifact: String,
    pub narration: Option<String>,
    pub final_path: PathBuf,
    pub audio_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl CachedResult {
    /// Record a successful final state; `None` unless the run completed
    pub fn from_state(state: &PipelineState) -> Option<Self> {
        if !state.is_success() {
            return None;
        }

        Some(Self {
            prompt: state.prompt.clone(),
            artifact: state.artifact.clone()?,
            narration: state.narration.clone(),
            final_path: state.final_path.clone()?,
            audio_path: state.audio_path.clone(),
            created_at: Utc::now(),
        })
    }

    /// Whether the cached media is still on disk
    pub fn is_available(&self) -> bool {
        self.final_path.exists()
    }

    /// Rebuild a final state from this record
    pub fn into_state(self, scripts_dir: &Path, videos_dir: &Path) -> PipelineState {
        let mut state = PipelineState::new(self.prompt, scripts_dir, videos_dir);
        state.artifact = Some(self.artifact);
        state.narration = self.narration;
        state.test_passed = true;
        state.final_path = Some(self.final_path);
        state.audio_path = self.audio_path;
        state.completed = true;
        state
    }
}

/// Storage for cached results
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedResult>>;

    async fn put(&self, key: &str, record: &CachedResult) -> Result<()>;
}

/// Cache that never hits
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl ResultCache for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<CachedResult>> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _record: &CachedResult) -> Result<()> {
        Ok(())
    }
}

/// Process-local cache, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CachedResult>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CachedResult>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Cache lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, record: &CachedResult) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Cache lock poisoned"))?;
        entries.insert(key.to_string(), record.clone());
        Ok(())
    }
}

/// SQLite-backed cache, one row per fingerprint.
///
/// Queries run on the blocking pool; the connection is shared with those
/// tasks through an `Arc`.
pub struct SqliteCache {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCache")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl SqliteCache {
    /// Open (or create) the cache database
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open cache database: {}", db_path.display()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS results (
                key TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .context("Failed to initialize cache schema")?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Path of the database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl ResultCache for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<CachedResult>> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();

        let raw = tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = conn.lock().map_err(|_| anyhow!("Cache lock poisoned"))?;
            let raw = conn
                .query_row(
                    "SELECT record FROM results WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to query cache")?;
            Ok(raw)
        })
        .await
        .context("Cache query task failed")??;

        raw.map(|json| serde_json::from_str(&json).context("Failed to parse cached record"))
            .transpose()
    }

    async fn put(&self, key: &str, record: &CachedResult) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize cached record")?;
        let created_at = record.created_at.to_rfc3339();
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock().map_err(|_| anyhow!("Cache lock poisoned"))?;
            conn.execute(
                "INSERT OR REPLACE INTO results (key, record, created_at) VALUES (?1, ?2, ?3)",
                params![key, json, created_at],
            )
            .context("Failed to write cache entry")?;
            Ok(())
        })
        .await
        .context("Cache write task failed")?
    }
}
