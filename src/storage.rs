//! File placement for generated scripts and media.
//!
//! A path handed to the pipeline always names a complete, closed file:
//! content goes to a hidden temporary sibling first and is renamed into
//! place.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A fresh path `<dir>/<prefix>_<uuid>.<ext>`
pub fn unique_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", prefix, Uuid::new_v4().simple(), extension))
}

/// Atomic write via temp file + rename
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = parent_of(path);
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let temp_path = parent.join(format!(".tmp_{}", Uuid::new_v4()));
    let written: Result<()> = async {
        let mut file = fs::File::create(&temp_path)
            .await
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(content)
            .await
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
        file.sync_all().await.context("Failed to sync temp file")?;
        fs::rename(&temp_path, path)
            .await
            .with_context(|| format!("Failed to rename temp file to {}", path.display()))
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    written
}

/// Move a finished file into `dest`, copying when a rename is not possible
/// (different filesystems)
pub async fn move_into_place(source: &Path, dest: &Path) -> Result<()> {
    let parent = parent_of(dest);
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    if fs::rename(source, dest).await.is_ok() {
        return Ok(());
    }

    let temp_path = parent.join(format!(".tmp_{}", Uuid::new_v4()));
    let copied: Result<()> = async {
        fs::copy(source, &temp_path).await.with_context(|| {
            format!("Failed to copy {} into {}", source.display(), parent.display())
        })?;
        fs::rename(&temp_path, dest)
            .await
            .with_context(|| format!("Failed to rename temp file to {}", dest.display()))
    }
    .await;

    if copied.is_err() {
        let _ = fs::remove_file(&temp_path).await;
        return copied;
    }

    fs::remove_file(source)
        .await
        .with_context(|| format!("Failed to remove {}", source.display()))?;

    Ok(())
}

fn parent_of(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
