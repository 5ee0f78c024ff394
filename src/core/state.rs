//! Typed pipeline state and partial updates.
//!
//! Nodes never mutate state in place. They return a [`StatePatch`] naming
//! only the fields they overwrite, and the executor folds it into a new
//! snapshot with [`PipelineState::merge`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::PipelineError;

/// The state threaded through every node of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Normalized topic the run was started with
    pub prompt: String,

    /// Directory receiving persisted scene scripts
    pub scripts_dir: PathBuf,

    /// Directory receiving rendered and merged videos
    pub videos_dir: PathBuf,

    /// Current scene script
    pub artifact: Option<String>,

    /// Narration text for speech synthesis
    pub narration: Option<String>,

    /// Where the current artifact was persisted
    pub script_path: Option<PathBuf>,

    /// Router success flag set by the compile check
    pub test_passed: bool,

    /// Rendered video (render branch)
    pub video_path: Option<PathBuf>,

    /// Render failure reason (render branch)
    pub render_error: Option<String>,

    /// Synthesized narration audio (audio branch)
    pub audio_path: Option<PathBuf>,

    /// Synthesis failure reason (audio branch)
    pub audio_error: Option<String>,

    /// Merged media produced by the final node
    pub final_path: Option<PathBuf>,

    /// Final success flag set by the merge node
    pub completed: bool,

    /// Sticky failure; cleared only by a successful repair or check
    pub error: Option<PipelineError>,

    /// Repair cycles performed so far
    pub retries: u32,
}

/// Final state handed back to callers of the pipeline
pub type FinalState = PipelineState;

impl PipelineState {
    /// Create the initial state for one invocation
    pub fn new(
        prompt: impl Into<String>,
        scripts_dir: impl Into<PathBuf>,
        videos_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            scripts_dir: scripts_dir.into(),
            videos_dir: videos_dir.into(),
            artifact: None,
            narration: None,
            script_path: None,
            test_passed: false,
            video_path: None,
            render_error: None,
            audio_path: None,
            audio_error: None,
            final_path: None,
            completed: false,
            error: None,
            retries: 0,
        }
    }

    /// Shallow overwrite: fields set in `patch` replace ours, the rest carry over
    pub fn merge(&self, patch: &StatePatch) -> Self {
        let mut next = self.clone();

        if let Some(ref v) = patch.artifact {
            next.artifact = Some(v.clone());
        }
        if let Some(ref v) = patch.narration {
            next.narration = Some(v.clone());
        }
        if let Some(ref v) = patch.script_path {
            next.script_path = Some(v.clone());
        }
        if let Some(v) = patch.test_passed {
            next.test_passed = v;
        }
        if let Some(ref v) = patch.video_path {
            next.video_path = Some(v.clone());
        }
        if let Some(ref v) = patch.render_error {
            next.render_error = Some(v.clone());
        }
        if let Some(ref v) = patch.audio_path {
            next.audio_path = Some(v.clone());
        }
        if let Some(ref v) = patch.audio_error {
            next.audio_error = Some(v.clone());
        }
        if let Some(ref v) = patch.final_path {
            next.final_path = Some(v.clone());
        }
        if let Some(v) = patch.completed {
            next.completed = v;
        }
        match patch.error {
            ErrorUpdate::Keep => {}
            ErrorUpdate::Set(ref e) => next.error = Some(e.clone()),
            ErrorUpdate::Clear => next.error = None,
        }
        if let Some(v) = patch.retries {
            debug_assert!(v >= self.retries, "retries must never decrease");
            next.retries = v;
        }

        next
    }

    /// Whether a sticky error is present
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Display form of the sticky error
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Whether the run produced merged media without error
    pub fn is_success(&self) -> bool {
        self.completed && self.error.is_none() && self.final_path.is_some()
    }
}

/// Named fields of [`PipelineState`] that nodes may write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Artifact,
    Narration,
    ScriptPath,
    TestPassed,
    VideoPath,
    RenderError,
    AudioPath,
    AudioError,
    FinalPath,
    Completed,
    Error,
    Retries,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Artifact => "artifact",
            Self::Narration => "narration",
            Self::ScriptPath => "script_path",
            Self::TestPassed => "test_passed",
            Self::VideoPath => "video_path",
            Self::RenderError => "render_error",
            Self::AudioPath => "audio_path",
            Self::AudioError => "audio_error",
            Self::FinalPath => "final_path",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Retries => "retries",
        };
        f.write_str(name)
    }
}

/// How a patch affects the sticky error
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorUpdate {
    /// Leave the current error untouched
    #[default]
    Keep,

    /// Record a new error
    Set(PipelineError),

    /// Clear the current error
    Clear,
}

/// A partial update returned by a node; only set fields are written
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatePatch {
    pub artifact: Option<String>,
    pub narration: Option<String>,
    pub script_path: Option<PathBuf>,
    pub test_passed: Option<bool>,
    pub video_path: Option<PathBuf>,
    pub render_error: Option<String>,
    pub audio_path: Option<PathBuf>,
    pub audio_error: Option<String>,
    pub final_path: Option<PathBuf>,
    pub completed: Option<bool>,
    pub error: ErrorUpdate,
    pub retries: Option<u32>,
}

impl StatePatch {
    /// A patch that changes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = Some(narration.into());
        self
    }

    pub fn with_script_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_path = Some(path.into());
        self
    }

    pub fn with_test_passed(mut self, passed: bool) -> Self {
        self.test_passed = Some(passed);
        self
    }

    pub fn with_video_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.video_path = Some(path.into());
        self
    }

    pub fn with_render_error(mut self, reason: impl Into<String>) -> Self {
        self.render_error = Some(reason.into());
        self
    }

    pub fn with_audio_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_path = Some(path.into());
        self
    }

    pub fn with_audio_error(mut self, reason: impl Into<String>) -> Self {
        self.audio_error = Some(reason.into());
        self
    }

    pub fn with_final_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.final_path = Some(path.into());
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn with_error(mut self, error: PipelineError) -> Self {
        self.error = ErrorUpdate::Set(error);
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = ErrorUpdate::Clear;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// The error this patch records, if any
    pub fn recorded_error(&self) -> Option<&PipelineError> {
        match self.error {
            ErrorUpdate::Set(ref e) => Some(e),
            _ => None,
        }
    }

    /// Why the node that produced this patch failed, if it did.
    ///
    /// Branch nodes report failure through their own error field rather
    /// than the sticky error.
    pub fn failure_reason(&self) -> Option<String> {
        self.recorded_error()
            .map(ToString::to_string)
            .or_else(|| self.render_error.clone())
            .or_else(|| self.audio_error.clone())
    }

    /// Fields this patch writes, in declaration order
    pub fn touched_fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.artifact.is_some() {
            fields.push(Field::Artifact);
        }
        if self.narration.is_some() {
            fields.push(Field::Narration);
        }
        if self.script_path.is_some() {
            fields.push(Field::ScriptPath);
        }
        if self.test_passed.is_some() {
            fields.push(Field::TestPassed);
        }
        if self.video_path.is_some() {
            fields.push(Field::VideoPath);
        }
        if self.render_error.is_some() {
            fields.push(Field::RenderError);
        }
        if self.audio_path.is_some() {
            fields.push(Field::AudioPath);
        }
        if self.audio_error.is_some() {
            fields.push(Field::AudioError);
        }
        if self.final_path.is_some() {
            fields.push(Field::FinalPath);
        }
        if self.completed.is_some() {
            fields.push(Field::Completed);
        }
        if self.error != ErrorUpdate::Keep {
            fields.push(Field::Error);
        }
        if self.retries.is_some() {
            fields.push(Field::Retries);
        }
        fields
    }

    /// Whether this patch writes nothing
    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }
}
