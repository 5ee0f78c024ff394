//! Command-line interface for animathics.
//!
//! Provides commands for generating videos, inspecting run journals,
//! showing the resolved configuration and checking external tools.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{
    ElevenLabsClient, FfmpegMuxer, GeminiClient, ManimRenderer, PythonCompileChecker,
};
use crate::config::{load_config, ResolvedConfig};
use crate::core::EventStore;
use crate::domain::{Run, RunState};
use crate::pipeline::{self, Dependencies};

/// animathics - Generate narrated math animations from a topic
#[derive(Parser, Debug)]
#[command(name = "animathics")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a narrated video for a topic
    Generate {
        /// Topic to explain (e.g. "pythagorean theorem")
        prompt: String,

        /// Directory for generated scene scripts (overrides config)
        #[arg(long)]
        scripts_dir: Option<PathBuf>,

        /// Directory for rendered and merged videos (overrides config)
        #[arg(long)]
        videos_dir: Option<PathBuf>,

        /// Skip the result cache for this run
        #[arg(long)]
        no_cache: bool,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,

    /// Check that external tools and services are reachable
    Doctor,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = load_config()?;

        match self.command {
            Commands::Generate {
                prompt,
                scripts_dir,
                videos_dir,
                no_cache,
            } => generate(&cfg, &prompt, scripts_dir, videos_dir, no_cache).await,
            Commands::Status { run_id } => show_status(&cfg, &run_id).await,
            Commands::Runs { limit } => list_runs(&cfg, limit).await,
            Commands::Config => show_config(&cfg),
            Commands::Doctor => doctor(&cfg).await,
        }
    }
}

/// Run the pipeline for one topic
async fn generate(
    cfg: &ResolvedConfig,
    prompt: &str,
    scripts_dir: Option<PathBuf>,
    videos_dir: Option<PathBuf>,
    no_cache: bool,
) -> Result<()> {
    let deps = Dependencies::from_config(cfg, !no_cache)?;
    let scripts_dir = scripts_dir.unwrap_or_else(|| cfg.scripts_dir.clone());
    let videos_dir = videos_dir.unwrap_or_else(|| cfg.videos_dir.clone());

    eprintln!("Generating video for: {}", prompt.trim());

    let outcome = pipeline::execute(&deps, prompt, &scripts_dir, &videos_dir).await;
    let state = outcome.state;

    if let Some(run_id) = outcome.run_id {
        eprintln!("Run ID: {}", run_id);
    }

    if let Some(ref error) = state.error {
        eprintln!("\n❌ Pipeline failed after {} repair cycle(s)", state.retries);
        eprintln!("   {}", error);
        if let Some(ref script) = state.script_path {
            eprintln!("   Last script: {}", script.display());
        }
        std::process::exit(1);
    }

    let final_path = state
        .final_path
        .as_ref()
        .context("Pipeline finished without a final video")?;

    eprintln!();
    if outcome.cached {
        eprintln!("✅ Served from cache");
    } else {
        eprintln!("✅ Video ready ({} repair cycle(s))", state.retries);
    }
    println!("Video: {}", final_path.display());
    if let Some(ref audio) = state.audio_path {
        println!("Audio: {}", audio.display());
    }

    Ok(())
}

/// Show the status of a specific run
async fn show_status(cfg: &ResolvedConfig, run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let store = EventStore::open_in(&cfg.runs_dir(), run_id).await?;
    let run = store
        .summary()
        .await?
        .with_context(|| format!("Run not found: {}", run_id))?;

    println!("Run ID: {}", run.id);
    println!("Description: {}", run.description);
    println!("State: {}", state_label(&run));
    match &run.state {
        RunState::Failed { error } => println!("Error: {}", error),
        RunState::LimitReached { limit } => println!("Limit: {}", limit),
        _ => {}
    }
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!("Node visits: {}", run.node_visits);
    println!("Repair cycles: {}", run.retries);

    if !run.node_statuses.is_empty() {
        let mut statuses: Vec<_> = run.node_statuses.iter().collect();
        statuses.sort_by(|a, b| a.0.cmp(b.0));
        println!("\nNode statuses:");
        for (node, status) in statuses {
            println!("  {}: {:?}", node, status);
        }
    }

    Ok(())
}

/// List recent runs, newest first
async fn list_runs(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let runs_dir = cfg.runs_dir();
    let ids = EventStore::list_runs(&runs_dir).await?;

    let mut runs: Vec<Run> = Vec::with_capacity(ids.len());
    for id in ids {
        let store = EventStore::open_in(&runs_dir, id).await?;
        if let Some(run) = store.summary().await? {
            runs.push(run);
        }
    }

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    println!("{:<38} {:<20} {:<15} {:<8}", "RUN ID", "STARTED", "STATE", "RETRIES");
    println!("{}", "-".repeat(84));

    for run in runs.into_iter().take(limit) {
        println!(
            "{:<38} {:<20} {:<15} {:<8}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            state_label(&run),
            run.retries
        );
    }

    Ok(())
}

fn state_label(run: &Run) -> &'static str {
    match (&run.state, run.cached) {
        (RunState::Completed, true) => "cached",
        (RunState::Running, _) => "running",
        (RunState::Completed, false) => "completed",
        (RunState::Failed { .. }, _) => "failed",
        (RunState::LimitReached { .. }, _) => "limit-reached",
    }
}

/// Show the resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    let key_status = |key: &Option<String>| if key.is_some() { "set" } else { "not set" };

    println!("animathics configuration");
    println!("{}", "=".repeat(40));
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:    {}", cfg.home.display());
    println!("  Scripts: {}", cfg.scripts_dir.display());
    println!("  Videos:  {}", cfg.videos_dir.display());
    println!("  Audio:   {}", cfg.audio_dir.display());
    println!("  Runs:    {}", cfg.runs_dir().display());
    println!();
    println!("Cache:");
    println!("  Enabled: {}", cfg.cache_enabled);
    println!("  Path:    {}", cfg.cache_path.display());
    println!();
    println!("Gemini:");
    println!("  Model:   {}", cfg.gemini.model);
    println!("  API key: {}", key_status(&cfg.gemini.api_key));
    println!("  Timeout: {}s", cfg.gemini.timeout_seconds);
    println!();
    println!("ElevenLabs:");
    println!("  Voice:   {}", cfg.elevenlabs.voice_id);
    println!("  Model:   {}", cfg.elevenlabs.model_id);
    println!("  API key: {}", key_status(&cfg.elevenlabs.api_key));
    println!("  Timeout: {}s", cfg.elevenlabs.timeout_seconds);
    println!();
    println!("Tools:");
    println!(
        "  python: {} (timeout {}s)",
        cfg.tools.python, cfg.tools.compile_timeout_seconds
    );
    println!(
        "  manim:  {} (timeout {}s)",
        cfg.tools.manim, cfg.tools.render_timeout_seconds
    );
    println!(
        "  ffmpeg: {} (timeout {}s)",
        cfg.tools.ffmpeg, cfg.tools.mux_timeout_seconds
    );
    println!();
    println!("Limits:");
    println!("  Max script size: {} bytes", cfg.limits.max_artifact_bytes);

    Ok(())
}

/// Probe every external dependency and report
async fn doctor(cfg: &ResolvedConfig) -> Result<()> {
    let mut failures = 0;

    let mut report = |name: &str, result: Result<()>| match result {
        Ok(()) => println!("  ✅ {}", name),
        Err(e) => {
            failures += 1;
            println!("  ❌ {}: {:#}", name, e);
        }
    };

    println!("Tools:");
    let python = PythonCompileChecker::new(
        cfg.tools.python.clone(),
        Duration::from_secs(cfg.tools.compile_timeout_seconds),
    );
    report(&cfg.tools.python, python.health_check().await);

    let manim = ManimRenderer::new(
        cfg.tools.manim.clone(),
        Duration::from_secs(cfg.tools.render_timeout_seconds),
    );
    report(&cfg.tools.manim, manim.health_check().await);

    let ffmpeg = FfmpegMuxer::new(
        cfg.tools.ffmpeg.clone(),
        Duration::from_secs(cfg.tools.mux_timeout_seconds),
    );
    report(&cfg.tools.ffmpeg, ffmpeg.health_check().await);

    println!("\nServices:");
    match cfg.gemini.api_key.clone() {
        Some(key) => {
            let result = match GeminiClient::new(
                key,
                cfg.gemini.model.clone(),
                Duration::from_secs(cfg.gemini.timeout_seconds),
            ) {
                Ok(client) => client.health_check().await,
                Err(e) => Err(e),
            };
            report("gemini", result);
        }
        None => println!("  ⏭️  gemini: GEMINI_API_KEY not set"),
    }

    match cfg.elevenlabs.api_key.clone() {
        Some(key) => {
            let result = match ElevenLabsClient::new(
                key,
                cfg.elevenlabs.voice_id.clone(),
                cfg.elevenlabs.model_id.clone(),
                cfg.audio_dir.clone(),
                Duration::from_secs(cfg.elevenlabs.timeout_seconds),
            ) {
                Ok(client) => client.health_check().await,
                Err(e) => Err(e),
            };
            report("elevenlabs", result);
        }
        None => println!("  ⏭️  elevenlabs: ELEVENLABS_API_KEY not set"),
    }

    if failures > 0 {
        anyhow::bail!("{} check(s) failed", failures);
    }

    println!("\nAll checks passed");
    Ok(())
}
