//! Audio/video muxing via `ffmpeg`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use super::process::{ensure_success, probe, run_tool};
use super::Muxer;
use crate::storage::{move_into_place, unique_path};

/// Muxer copying the video stream and encoding audio as AAC
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    /// Path to the ffmpeg binary (default: "ffmpeg")
    binary_path: String,
    timeout: Duration,
}

impl FfmpegMuxer {
    pub fn new(binary_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout,
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        probe(&self.binary_path, "-version").await
    }
}

/// Arguments for `ffmpeg -y -i v -i a -c:v copy -c:a aac -shortest out`
pub fn mux_args<'a>(video: &'a Path, audio: &'a Path, output: &'a Path) -> Vec<&'a OsStr> {
    vec![
        OsStr::new("-y"),
        OsStr::new("-i"),
        video.as_os_str(),
        OsStr::new("-i"),
        audio.as_os_str(),
        OsStr::new("-c:v"),
        OsStr::new("copy"),
        OsStr::new("-c:a"),
        OsStr::new("aac"),
        OsStr::new("-shortest"),
        output.as_os_str(),
    ]
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

        let dest = unique_path(output_dir, "final", "mp4");
        // ffmpeg picks the container from the extension, so the temp file keeps it
        let partial = unique_path(output_dir, ".partial", "mp4");

        let output = run_tool(
            &self.binary_path,
            mux_args(video, audio, &partial),
            None,
            self.timeout,
        )
        .await;

        let finished = match output {
            Ok(output) => ensure_success(&self.binary_path, &output),
            Err(e) => Err(e),
        };

        if let Err(e) = finished {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }

        if let Err(e) = move_into_place(&partial, &dest).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }
        Ok(dest)
    }
}
