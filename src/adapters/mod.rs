//! Adapter interfaces for external systems.
//!
//! The pipeline only sees these traits. Concrete adapters talk to the text
//! generation API, the speech API and the local command-line tools
//! (python, manim, ffmpeg). Every call returns `anyhow::Result`; nodes turn
//! failures into state.

pub mod cleaner;
pub mod compile;
pub mod elevenlabs;
pub mod ffmpeg;
pub mod gemini;
pub mod manim;
pub mod process;
pub mod prompts;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

pub use compile::PythonCompileChecker;
pub use elevenlabs::ElevenLabsClient;
pub use ffmpeg::FfmpegMuxer;
pub use gemini::GeminiClient;
pub use manim::ManimRenderer;

/// Output of a generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Cleaned scene script
    pub artifact: String,

    /// Narration text, if the response carried one
    pub narration: Option<String>,
}

/// Text generation: first draft, layout alignment and repair
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a scene script (and narration) for a topic
    async fn generate(&self, topic: &str) -> Result<Generated>;

    /// Validate and clean up an existing script
    async fn align(&self, artifact: &str) -> Result<String>;

    /// Repair a script given the error it produced
    async fn repair(&self, artifact: &str, error: &str, topic: &str) -> Result<String>;
}

/// Syntax check of a persisted script
#[async_trait]
pub trait CompileChecker: Send + Sync {
    /// `Err` carries the checker's error output
    async fn check(&self, script: &Path) -> Result<()>;
}

/// Video rendering of a persisted script
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `script` and place the video in `output_dir`
    async fn render(&self, script: &Path, output_dir: &Path) -> Result<PathBuf>;
}

/// Text-to-speech
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into an audio file
    async fn synthesize(&self, text: &str) -> Result<PathBuf>;
}

/// Combining a video and an audio track
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Mux `video` and `audio` into a new file in `output_dir`
    async fn mux(&self, video: &Path, audio: &Path, output_dir: &Path) -> Result<PathBuf>;
}
