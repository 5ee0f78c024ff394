//! The animation pipeline: its dependencies, its graph and its entry point.
//!
//! ```text
//! generate -> align -> persist -> test
//! test --router--> pass            -> {render, audio} -> merge
//!              --> fail, budget    -> repair -> persist (back edge)
//!              --> otherwise       -> end
//! ```

pub mod nodes;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::{
    CompileChecker, ElevenLabsClient, FfmpegMuxer, GeminiClient, Generator, ManimRenderer, Muxer,
    PythonCompileChecker, Renderer, SpeechSynthesizer,
};
use crate::cache::{fingerprint, CachedResult, NoCache, ResultCache, SqliteCache};
use crate::config::ResolvedConfig;
use crate::core::{
    EventStore, ExecutionLimits, Executor, FinalState, Graph, GraphError, Next, PipelineState,
    RetryRouter, StatePatch,
};
use crate::domain::{Event, EventType, NodeStatus, PipelineError};

pub use nodes::{
    AlignNode, AudioNode, GenerateNode, MergeNode, PersistNode, RenderNode, RepairNode, TestNode,
    ALIGN, AUDIO, GENERATE, MERGE, PERSIST, RENDER, REPAIR, TEST,
};

/// Label of the repair -> persist back edge
pub const RETRY_EDGE: &str = "retry";

/// Everything the pipeline calls out to, built once per process
#[derive(Clone)]
pub struct Dependencies {
    pub generator: Arc<dyn Generator>,
    pub checker: Arc<dyn CompileChecker>,
    pub renderer: Arc<dyn Renderer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub muxer: Arc<dyn Muxer>,
    pub cache: Arc<dyn ResultCache>,

    /// Where run journals go (None = no journal)
    pub runs_dir: Option<PathBuf>,

    /// Limits applied to every run. The visit budget is capped by the one
    /// derived from the graph; a lower value here wins.
    pub limits: ExecutionLimits,
}

impl Dependencies {
    /// Build the production adapters from configuration
    pub fn from_config(config: &ResolvedConfig, use_cache: bool) -> Result<Self> {
        let gemini_key = config
            .gemini
            .api_key
            .clone()
            .context("GEMINI_API_KEY is not set (environment or config file)")?;
        let elevenlabs_key = config
            .elevenlabs
            .api_key
            .clone()
            .context("ELEVENLABS_API_KEY is not set (environment or config file)")?;

        let generator = GeminiClient::new(
            gemini_key,
            config.gemini.model.clone(),
            Duration::from_secs(config.gemini.timeout_seconds),
        )?;
        let synthesizer = ElevenLabsClient::new(
            elevenlabs_key,
            config.elevenlabs.voice_id.clone(),
            config.elevenlabs.model_id.clone(),
            config.audio_dir.clone(),
            Duration::from_secs(config.elevenlabs.timeout_seconds),
        )?;

        let cache: Arc<dyn ResultCache> = if use_cache && config.cache_enabled {
            Arc::new(SqliteCache::open(&config.cache_path)?)
        } else {
            Arc::new(NoCache)
        };

        Ok(Self {
            generator: Arc::new(generator),
            checker: Arc::new(PythonCompileChecker::new(
                config.tools.python.clone(),
                Duration::from_secs(config.tools.compile_timeout_seconds),
            )),
            renderer: Arc::new(ManimRenderer::new(
                config.tools.manim.clone(),
                Duration::from_secs(config.tools.render_timeout_seconds),
            )),
            synthesizer: Arc::new(synthesizer),
            muxer: Arc::new(FfmpegMuxer::new(
                config.tools.ffmpeg.clone(),
                Duration::from_secs(config.tools.mux_timeout_seconds),
            )),
            cache,
            runs_dir: Some(config.runs_dir()),
            limits: ExecutionLimits {
                max_artifact_bytes: config.limits.max_artifact_bytes,
                ..Default::default()
            },
        })
    }
}

/// Trim and lowercase a prompt; the result is what gets fingerprinted
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.trim().to_lowercase()
}

/// Wire the pipeline graph over `deps`
pub fn build_graph(deps: &Dependencies) -> Result<Graph, GraphError> {
    Graph::builder()
        .node(Arc::new(GenerateNode::new(Arc::clone(&deps.generator))))
        .node(Arc::new(AlignNode::new(Arc::clone(&deps.generator))))
        .node(Arc::new(PersistNode::new(deps.limits.clone())))
        .node(Arc::new(TestNode::new(Arc::clone(&deps.checker))))
        .node(Arc::new(RepairNode::new(Arc::clone(&deps.generator))))
        .node(Arc::new(RenderNode::new(Arc::clone(&deps.renderer))))
        .node(Arc::new(AudioNode::new(Arc::clone(&deps.synthesizer))))
        .node(Arc::new(MergeNode::new(Arc::clone(&deps.muxer))))
        .entry(GENERATE)
        .edge(GENERATE, ALIGN)
        .edge(ALIGN, PERSIST)
        .edge(PERSIST, TEST)
        .route(TEST, RetryRouter::new(Next::Parallel(vec![RENDER, AUDIO]), REPAIR))
        .back_edge(REPAIR, PERSIST, RETRY_EDGE)
        .join(&[RENDER, AUDIO], MERGE)
        .build()
}

/// Result of one pipeline invocation
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Journal id (None when no journal was written)
    pub run_id: Option<Uuid>,

    /// Whether the result came from the cache
    pub cached: bool,

    /// Final state; inspect `error`
    pub state: FinalState,
}

/// Run the pipeline for one prompt and return the final state
pub async fn run_pipeline(
    deps: &Dependencies,
    prompt: &str,
    scripts_dir: &Path,
    videos_dir: &Path,
) -> FinalState {
    execute(deps, prompt, scripts_dir, videos_dir).await.state
}

/// Run the pipeline for one prompt, reporting journal and cache details
pub async fn execute(
    deps: &Dependencies,
    prompt: &str,
    scripts_dir: &Path,
    videos_dir: &Path,
) -> PipelineOutcome {
    let prompt = normalize_prompt(prompt);
    let initial = PipelineState::new(prompt.as_str(), scripts_dir, videos_dir);

    if prompt.is_empty() {
        return PipelineOutcome {
            run_id: None,
            cached: false,
            state: initial.merge(&StatePatch::empty().with_error(PipelineError::Generation {
                reason: "Prompt is empty".to_string(),
            })),
        };
    }

    let journal = open_journal(deps).await;
    let run_id = journal.as_ref().map(EventStore::run_id);

    let key = fingerprint(&prompt);
    if let Some(hit) = lookup(deps, &key).await {
        info!(%prompt, "Serving cached result");
        if let Some(ref journal) = journal {
            record_cache_hit(journal, &prompt).await;
        }
        return PipelineOutcome {
            run_id,
            cached: true,
            state: hit.into_state(scripts_dir, videos_dir),
        };
    }

    let graph = match build_graph(deps) {
        Ok(graph) => Arc::new(graph),
        Err(e) => {
            return PipelineOutcome {
                run_id: None,
                cached: false,
                state: initial.merge(&StatePatch::empty().with_error(PipelineError::Step {
                    node: "graph".to_string(),
                    reason: e.to_string(),
                })),
            };
        }
    };

    let derived = ExecutionLimits::for_graph(&graph);
    let limits = ExecutionLimits {
        max_node_visits: deps.limits.max_node_visits.min(derived.max_node_visits),
        max_artifact_bytes: deps.limits.max_artifact_bytes,
    };
    let mut executor = Executor::new(graph).with_limits(limits);
    if let Some(journal) = journal {
        executor = executor.with_journal(journal);
    }

    let state = executor.run(initial).await;

    if let Some(record) = CachedResult::from_state(&state) {
        if let Err(e) = deps.cache.put(&key, &record).await {
            warn!(error = %e, "Failed to cache result");
        }
    }

    PipelineOutcome {
        run_id,
        cached: false,
        state,
    }
}

async fn lookup(deps: &Dependencies, key: &str) -> Option<CachedResult> {
    match deps.cache.get(key).await {
        Ok(Some(hit)) if hit.is_available() => Some(hit),
        Ok(Some(hit)) => {
            debug!(final_path = %hit.final_path.display(), "Cached media is gone, running again");
            None
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Cache lookup failed");
            None
        }
    }
}

async fn open_journal(deps: &Dependencies) -> Option<EventStore> {
    let runs_dir = deps.runs_dir.as_ref()?;
    match EventStore::open_in(runs_dir, Uuid::new_v4()).await {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "Failed to open run journal, continuing without one");
            None
        }
    }
}

async fn record_cache_hit(journal: &EventStore, prompt: &str) {
    let run_id = journal.run_id();
    let events = [
        Event::new(
            run_id,
            None,
            EventType::RunStarted,
            format!("Pipeline started for '{}'", prompt),
            NodeStatus::Running,
        ),
        Event::new(
            run_id,
            None,
            EventType::CacheHit,
            "Result served from cache".to_string(),
            NodeStatus::Completed,
        ),
        Event::new(
            run_id,
            None,
            EventType::RunCompleted,
            "Pipeline finished".to_string(),
            NodeStatus::Completed,
        ),
    ];

    for event in &events {
        if let Err(e) = journal.append(event).await {
            warn!(error = %e, "Failed to journal event");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prompt() {
        assert_eq!(normalize_prompt("  Pythagorean Theorem \n"), "pythagorean theorem");
        assert_eq!(normalize_prompt("   "), "");
    }
}
