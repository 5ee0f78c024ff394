//! Configuration for animathics.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ANIMATHICS_HOME, GEMINI_API_KEY,
//!    ELEVENLABS_API_KEY, GEMINI_MODEL)
//! 2. Config file (.animathics/config.yaml)
//! 3. Defaults (~/.animathics)
//!
//! Config file discovery:
//! - Searches current directory and parents for .animathics/config.yaml
//! - `paths.home` is relative to the .animathics/ directory; the other
//!   paths are relative to the project root (the parent of .animathics/)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Directory name searched for upward from the working directory
pub const CONFIG_DIR: &str = ".animathics";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub gemini: Option<GeminiConfig>,
    #[serde(default)]
    pub elevenlabs: Option<ElevenLabsConfig>,
    #[serde(default)]
    pub tools: Option<ToolsConfig>,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .animathics/)
    pub home: Option<String>,
    /// Generated scripts (relative to project root)
    pub scripts: Option<String>,
    /// Rendered and merged videos (relative to project root)
    pub videos: Option<String>,
    /// Synthesized narration (relative to project root)
    pub audio: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElevenLabsConfig {
    pub api_key: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    pub python: Option<String>,
    pub manim: Option<String>,
    pub ffmpeg: Option<String>,
    pub compile_timeout_seconds: Option<u64>,
    pub render_timeout_seconds: Option<u64>,
    pub mux_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    pub enabled: Option<bool>,
    /// Database file (relative to home)
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    pub max_artifact_bytes: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Engine state (journals, cache)
    pub home: PathBuf,
    pub scripts_dir: PathBuf,
    pub videos_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub cache_enabled: bool,
    pub cache_path: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub gemini: GeminiSettings,
    pub elevenlabs: ElevenLabsSettings,
    pub tools: ToolSettings,
    pub limits: LimitSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElevenLabsSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub voice_id: String,
    pub model_id: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSettings {
    pub python: String,
    pub manim: String,
    pub ffmpeg: String,
    pub compile_timeout_seconds: u64,
    pub render_timeout_seconds: u64,
    pub mux_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitSettings {
    pub max_artifact_bytes: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            timeout_seconds: 120,
        }
    }
}

impl Default for ElevenLabsSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            timeout_seconds: 120,
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            manim: "manim".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            compile_timeout_seconds: 60,
            render_timeout_seconds: 600,
            mux_timeout_seconds: 300,
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_artifact_bytes: 1_048_576, // 1MB
        }
    }
}

impl ResolvedConfig {
    /// Run journals ($ANIMATHICS_HOME/runs)
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine a parsed config file, environment lookups and defaults
fn resolve<E>(
    default_home: PathBuf,
    config_file: Option<(PathBuf, ConfigFile)>,
    env: E,
) -> ResolvedConfig
where
    E: Fn(&str) -> Option<String>,
{
    let (config_path, file) = match config_file {
        Some((path, file)) => (Some(path), file),
        None => (None, ConfigFile::default()),
    };

    // .animathics/ and the project root above it
    let config_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);
    let base_dir = config_dir.as_deref().and_then(Path::parent).map(Path::to_path_buf);

    let home = match (env("ANIMATHICS_HOME"), &file.paths.home, &config_dir) {
        (Some(env_home), _, _) => PathBuf::from(env_home),
        (None, Some(home), Some(dir)) => resolve_path(dir, home),
        _ => default_home,
    };

    let project_path = |configured: &Option<String>, default: &str| match (configured, &base_dir) {
        (Some(p), Some(base)) => resolve_path(base, p),
        (Some(p), None) => PathBuf::from(p),
        (None, _) => home.join(default),
    };
    let scripts_dir = project_path(&file.paths.scripts, "scripts");
    let videos_dir = project_path(&file.paths.videos, "videos");
    let audio_dir = project_path(&file.paths.audio, "audio");

    let cache = file.cache.unwrap_or_default();
    let cache_path = cache
        .path
        .as_deref()
        .map(|p| resolve_path(&home, p))
        .unwrap_or_else(|| home.join("cache.db"));

    let gemini_file = file.gemini.unwrap_or_default();
    let gemini_defaults = GeminiSettings::default();
    let gemini = GeminiSettings {
        api_key: env("GEMINI_API_KEY").or(gemini_file.api_key),
        model: env("GEMINI_MODEL")
            .or(gemini_file.model)
            .unwrap_or(gemini_defaults.model),
        timeout_seconds: gemini_file
            .timeout_seconds
            .unwrap_or(gemini_defaults.timeout_seconds),
    };

    let eleven_file = file.elevenlabs.unwrap_or_default();
    let eleven_defaults = ElevenLabsSettings::default();
    let elevenlabs = ElevenLabsSettings {
        api_key: env("ELEVENLABS_API_KEY").or(eleven_file.api_key),
        voice_id: eleven_file.voice_id.unwrap_or(eleven_defaults.voice_id),
        model_id: eleven_file.model_id.unwrap_or(eleven_defaults.model_id),
        timeout_seconds: eleven_file
            .timeout_seconds
            .unwrap_or(eleven_defaults.timeout_seconds),
    };

    let tools_file = file.tools.unwrap_or_default();
    let tool_defaults = ToolSettings::default();
    let tools = ToolSettings {
        python: tools_file.python.unwrap_or(tool_defaults.python),
        manim: tools_file.manim.unwrap_or(tool_defaults.manim),
        ffmpeg: tools_file.ffmpeg.unwrap_or(tool_defaults.ffmpeg),
        compile_timeout_seconds: tools_file
            .compile_timeout_seconds
            .unwrap_or(tool_defaults.compile_timeout_seconds),
        render_timeout_seconds: tools_file
            .render_timeout_seconds
            .unwrap_or(tool_defaults.render_timeout_seconds),
        mux_timeout_seconds: tools_file
            .mux_timeout_seconds
            .unwrap_or(tool_defaults.mux_timeout_seconds),
    };

    let limits = LimitSettings {
        max_artifact_bytes: file
            .limits
            .and_then(|l| l.max_artifact_bytes)
            .unwrap_or_else(|| LimitSettings::default().max_artifact_bytes),
    };

    ResolvedConfig {
        home,
        scripts_dir,
        videos_dir,
        audio_dir,
        cache_enabled: cache.enabled.unwrap_or(true),
        cache_path,
        config_file: config_path,
        gemini,
        elevenlabs,
        tools,
        limits,
    }
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config_file = match find_config_file(&cwd) {
        Some(path) => {
            let file = load_config_file(&path)?;
            Some((path, file))
        }
        None => None,
    };

    Ok(resolve(default_home, config_file, |key| {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }))
}
