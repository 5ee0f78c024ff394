//! Video rendering via the `manim` CLI.
//!
//! Each render gets its own media directory so concurrent renders never
//! pick up each other's output. The finished video is moved into the
//! output directory as `<script stem>.mp4`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cleaner::SCENE_CLASS;
use super::process::{ensure_success, probe, run_tool};
use super::Renderer;
use crate::storage::move_into_place;

/// Renderer backed by Manim Community
#[derive(Debug, Clone)]
pub struct ManimRenderer {
    /// Path to the manim binary (default: "manim")
    binary_path: String,
    /// Quality flag passed to manim (default: "-ql")
    quality: String,
    timeout: Duration,
}

impl ManimRenderer {
    pub fn new(binary_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            quality: "-ql".to_string(),
            timeout,
        }
    }

    /// Use a different quality flag (e.g. "-qm")
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub async fn health_check(&self) -> Result<()> {
        probe(&self.binary_path, "--version").await
    }
}

/// Locate `<media>/videos/<stem>/**/GeneratedScene.mp4`
pub fn find_rendered_video(media_dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let pattern = media_dir
        .join("videos")
        .join(stem)
        .join("**")
        .join(format!("{}.mp4", SCENE_CLASS));
    let pattern = pattern.to_string_lossy();

    let mut matches = glob::glob(&pattern)
        .with_context(|| format!("Invalid glob pattern: {}", pattern))?
        .filter_map(|entry| entry.ok())
        .collect::<Vec<_>>();
    matches.sort();

    Ok(matches.into_iter().next())
}

#[async_trait]
impl Renderer for ManimRenderer {
    async fn render(&self, script: &Path, output_dir: &Path) -> Result<PathBuf> {
        let stem = script
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Script has no usable file name: {}", script.display()))?
            .to_string();

        let media_dir = output_dir.join(format!(".media_{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&media_dir)
            .await
            .with_context(|| format!("Failed to create media directory: {}", media_dir.display()))?;

        let result: Result<PathBuf> = async {
            let output = run_tool(
                &self.binary_path,
                [
                    OsStr::new(&self.quality),
                    OsStr::new("--media_dir"),
                    media_dir.as_os_str(),
                    script.as_os_str(),
                    OsStr::new(SCENE_CLASS),
                ],
                None,
                self.timeout,
            )
            .await?;
            ensure_success(&self.binary_path, &output)?;

            let rendered = find_rendered_video(&media_dir, &stem)?
                .context("Rendered video not found")?;
            debug!(rendered = %rendered.display(), "Manim produced video");

            let dest = output_dir.join(format!("{}.mp4", stem));
            move_into_place(&rendered, &dest).await?;
            Ok(dest)
        }
        .await;

        if let Err(e) = fs::remove_dir_all(&media_dir).await {
            warn!(media_dir = %media_dir.display(), error = %e, "Failed to clean up media directory");
        }

        result
    }
}
