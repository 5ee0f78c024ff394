//! The eight nodes of the animation pipeline.
//!
//! Each node wraps one adapter call through [`invoke`] and turns the
//! outcome into a patch. Nodes before the router short-circuit with an
//! empty patch while a sticky error is present.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::adapters::cleaner::default_narration;
use crate::adapters::{CompileChecker, Generator, Muxer, Renderer, SpeechSynthesizer};
use crate::core::{
    invoke, ExecutionLimits, Field, Node, NodeId, PipelineState, StatePatch, MAX_RETRIES,
};
use crate::domain::PipelineError;
use crate::storage::{unique_path, write_atomic};

pub const GENERATE: NodeId = "generate";
pub const ALIGN: NodeId = "align";
pub const PERSIST: NodeId = "persist";
pub const TEST: NodeId = "test";
pub const REPAIR: NodeId = "repair";
pub const RENDER: NodeId = "render";
pub const AUDIO: NodeId = "audio";
pub const MERGE: NodeId = "merge";

fn step_error(node: NodeId, reason: impl Into<String>) -> PipelineError {
    PipelineError::Step {
        node: node.to_string(),
        reason: reason.into(),
    }
}

/// Produces the first scene script and its narration
pub struct GenerateNode {
    generator: Arc<dyn Generator>,
}

impl GenerateNode {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node for GenerateNode {
    fn name(&self) -> NodeId {
        GENERATE
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::Artifact, Field::Narration, Field::Error]
    }

    async fn run(&self, state: &PipelineState) -> StatePatch {
        if state.has_error() {
            return StatePatch::empty();
        }

        match invoke(GENERATE, self.generator.generate(&state.prompt)).await {
            Ok(generated) => {
                let narration = match generated.narration {
                    Some(n) => n,
                    None => {
                        debug!("Generator returned no narration, using default");
                        default_narration(&state.prompt)
                    }
                };
                StatePatch::empty()
                    .with_artifact(generated.artifact)
                    .with_narration(narration)
            }
            Err(failure) => StatePatch::empty().with_error(PipelineError::Generation {
                reason: failure.reason,
            }),
        }
    }
}

/// Layout clean-up pass; keeps the original script when it fails
pub struct AlignNode {
    generator: Arc<dyn Generator>,
}

impl AlignNode {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node for AlignNode {
    fn name(&self) -> NodeId {
        ALIGN
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::Artifact]
    }

    async fn run(&self, state: &PipelineState) -> StatePatch {
        let artifact = match (&state.error, &state.artifact) {
            (None, Some(artifact)) => artifact,
            _ => return StatePatch::empty(),
        };

        match invoke(ALIGN, self.generator.align(artifact)).await {
            Ok(aligned) => StatePatch::empty().with_artifact(aligned),
            Err(failure) => {
                warn!(reason = %failure.reason, "Alignment failed, keeping original script");
                StatePatch::empty()
            }
        }
    }
}

/// Writes the current script to a fresh file in the scripts directory
pub struct PersistNode {
    limits: ExecutionLimits,
}

impl PersistNode {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Node for PersistNode {
    fn name(&self) -> NodeId {
        PERSIST
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::ScriptPath, Field::Error]
    }

    async fn run(&self, state: &PipelineState) -> StatePatch {
        if state.has_error() {
            return StatePatch::empty();
        }

        let Some(ref artifact) = state.artifact else {
            return StatePatch::empty().with_error(PipelineError::Generation {
                reason: "No script to persist".to_string(),
            });
        };

        if let Err(violation) = self.limits.validate_artifact(artifact) {
            warn!(%violation, "Refusing to persist oversized script");
            return StatePatch::empty().with_error(step_error(PERSIST, violation.to_string()));
        }

        let path = unique_path(&state.scripts_dir, "video", "py");
        match invoke(PERSIST, write_atomic(&path, artifact.as_bytes())).await {
            Ok(()) => {
                debug!(path = %path.display(), "Script persisted");
                StatePatch::empty().with_script_path(path)
            }
            Err(failure) => StatePatch::empty().with_error(step_error(PERSIST, failure.reason)),
        }
    }
}

/// Compile check of the persisted script; the router decides on its result
pub struct TestNode {
    checker: Arc<dyn CompileChecker>,
    max_retries: u32,
}

impl TestNode {
    pub fn new(checker: Arc<dyn CompileChecker>) -> Self {
        Self {
            checker,
            max_retries: MAX_RETRIES,
        }
    }
}

#[async_trait]
impl Node for TestNode {
    fn name(&self) -> NodeId {
        TEST
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::TestPassed, Field::Error]
    }

    async fn run(&self, state: &PipelineState) -> StatePatch {
        if state.has_error() {
            return StatePatch::empty();
        }

        let Some(ref script) = state.script_path else {
            return StatePatch::empty()
                .with_test_passed(false)
                .with_error(step_error(TEST, "No persisted script to check"));
        };

        match invoke(TEST, self.checker.check(script)).await {
            Ok(()) => {
                info!(retries = state.retries, "Compile check passed");
                StatePatch::empty().with_test_passed(true).clear_error()
            }
            Err(failure) if state.retries >= self.max_retries => {
                warn!(retries = state.retries, "Compile check failed, retry budget spent");
                StatePatch::empty()
                    .with_test_passed(false)
                    .with_error(PipelineError::Exhausted {
                        last_error: failure.reason,
                    })
            }
            Err(failure) => {
                info!(retries = state.retries, "Compile check failed");
                StatePatch::empty()
                    .with_test_passed(false)
                    .with_error(PipelineError::Validation {
                        reason: failure.reason,
                    })
            }
        }
    }
}

/// Asks the generator to fix a failed script; always spends one retry
pub struct RepairNode {
    generator: Arc<dyn Generator>,
}

impl RepairNode {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Node for RepairNode {
    fn name(&self) -> NodeId {
        REPAIR
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::Artifact, Field::Error, Field::Retries]
    }

    async fn run(&self, state: &PipelineState) -> StatePatch {
        let retries = state.retries + 1;

        let (error, artifact) = match (&state.error, &state.artifact) {
            (Some(error), Some(artifact)) => (error, artifact),
            _ => {
                return StatePatch::empty()
                    .with_retries(retries)
                    .with_error(step_error(REPAIR, "Nothing to repair"));
            }
        };

        let error_output = match error {
            PipelineError::Validation { reason } => reason.clone(),
            PipelineError::Exhausted { last_error } => last_error.clone(),
            other => other.to_string(),
        };

        info!(attempt = retries, "Repairing script");

        match invoke(
            REPAIR,
            self.generator.repair(artifact, &error_output, &state.prompt),
        )
        .await
        {
            Ok(fixed) => StatePatch::empty()
                .with_artifact(fixed)
                .clear_error()
                .with_retries(retries),
            Err(failure) => StatePatch::empty()
                .with_error(step_error(REPAIR, failure.reason))
                .with_retries(retries),
        }
    }

    fn failure_patch(&self, state: &PipelineState, reason: String) -> StatePatch {
        StatePatch::empty()
            .with_error(step_error(REPAIR, reason))
            .with_retries(state.retries + 1)
    }
}

/// Fan-out branch: renders the persisted script
pub struct RenderNode {
    renderer: Arc<dyn Renderer>,
}

impl RenderNode {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl Node for RenderNode {
    fn name(&self) -> NodeId {
        RENDER
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::VideoPath, Field::RenderError]
    }

    async fn run(&self, state: &PipelineState) -> StatePatch {
        let Some(ref script) = state.script_path else {
            return StatePatch::empty().with_render_error("No persisted script to render");
        };

        match invoke(RENDER, self.renderer.render(script, &state.videos_dir)).await {
            Ok(video) => StatePatch::empty().with_video_path(video),
            Err(failure) => StatePatch::empty().with_render_error(failure.reason),
        }
    }

    fn failure_patch(&self, _state: &PipelineState, reason: String) -> StatePatch {
        StatePatch::empty().with_render_error(reason)
    }
}

/// Fan-out branch: synthesizes the narration
pub struct AudioNode {
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl AudioNode {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl Node for AudioNode {
    fn name(&self) -> NodeId {
        AUDIO
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::AudioPath, Field::AudioError]
    }

    async fn run(&self, state: &PipelineState) -> StatePatch {
        let narration = state
            .narration
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_narration(&state.prompt));

        match invoke(AUDIO, self.synthesizer.synthesize(&narration)).await {
            Ok(audio) => StatePatch::empty().with_audio_path(audio),
            Err(failure) => StatePatch::empty().with_audio_error(failure.reason),
        }
    }

    fn failure_patch(&self, _state: &PipelineState, reason: String) -> StatePatch {
        StatePatch::empty().with_audio_error(reason)
    }
}

/// Join target: muxes video and audio into the final file
pub struct MergeNode {
    muxer: Arc<dyn Muxer>,
}

impl MergeNode {
    pub fn new(muxer: Arc<dyn Muxer>) -> Self {
        Self { muxer }
    }
}

#[async_trait]
impl Node for MergeNode {
    fn name(&self) -> NodeId {
        MERGE
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::FinalPath, Field::Completed, Field::Error]
    }

    async fn run(&self, state: &PipelineState) -> StatePatch {
        if state.has_error() {
            return StatePatch::empty();
        }

        // Render is reported first when both branches failed
        if let Some(ref reason) = state.render_error {
            return StatePatch::empty().with_error(PipelineError::Branch {
                branch: RENDER.to_string(),
                reason: reason.clone(),
            });
        }
        if let Some(ref reason) = state.audio_error {
            return StatePatch::empty().with_error(PipelineError::Branch {
                branch: AUDIO.to_string(),
                reason: reason.clone(),
            });
        }

        let (video, audio) = match (&state.video_path, &state.audio_path) {
            (Some(video), Some(audio)) => (video, audio),
            (video, audio) => {
                let missing: Vec<&str> = [
                    video.is_none().then_some("video_path"),
                    audio.is_none().then_some("audio_path"),
                ]
                .into_iter()
                .flatten()
                .collect();
                return StatePatch::empty().with_error(PipelineError::JoinPrecondition {
                    missing: missing.join(", "),
                });
            }
        };

        match invoke(MERGE, self.muxer.mux(video, audio, &state.videos_dir)).await {
            Ok(final_path) => {
                info!(final_path = %final_path.display(), "Media merged");
                StatePatch::empty()
                    .with_final_path(final_path)
                    .with_completed(true)
            }
            Err(failure) => StatePatch::empty().with_error(step_error(MERGE, failure.reason)),
        }
    }
}
