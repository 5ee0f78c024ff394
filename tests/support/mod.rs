//! Fake adapters for integration tests.
//!
//! Every fake writes real files inside a TempDir so paths in the final
//! state can be checked on disk. Outcomes are scripted per call.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use animathics::adapters::{
    CompileChecker, Generated, Generator, Muxer, Renderer, SpeechSynthesizer,
};
use animathics::cache::{NoCache, ResultCache};
use animathics::core::ExecutionLimits;
use animathics::pipeline::Dependencies;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

pub const SCENE: &str = "from manim import *\n\nclass GeneratedScene(Scene):\n    def construct(self):\n        self.play(Create(Circle()))\n";
pub const BROKEN_SCENE: &str = "from manim import *\n\nclass GeneratedScene(Scene):\n    def construct(self)\n";
pub const NARRATION: &str = "A circle is the set of points at a fixed distance from a center.";

/// How a fake call behaves
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(String),
    Panic,
}

/// Pops scripted outcomes; the last one repeats once the script runs out
#[derive(Debug)]
struct Script<T: Clone> {
    outcomes: Mutex<VecDeque<T>>,
    last: T,
}

impl<T: Clone> Script<T> {
    fn new(outcomes: Vec<T>, fallback: T) -> Self {
        let last = outcomes.last().cloned().unwrap_or(fallback);
        Self {
            outcomes: Mutex::new(outcomes.into()),
            last,
        }
    }

    fn next(&self) -> T {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last.clone())
    }
}

/// Generator with scripted generate/repair results
pub struct FakeGenerator {
    generate: Script<Result<Generated, String>>,
    align: Behavior,
    repair: Script<Result<String, String>>,
    generate_panics: bool,
    repair_panics: bool,
    pub generate_calls: AtomicUsize,
    pub align_calls: AtomicUsize,
    pub repair_calls: AtomicUsize,
    /// Error text handed to each repair call
    pub repair_errors: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            generate: Script::new(
                vec![Ok(Generated {
                    artifact: SCENE.to_string(),
                    narration: Some(NARRATION.to_string()),
                })],
                Ok(Generated {
                    artifact: SCENE.to_string(),
                    narration: None,
                }),
            ),
            align: Behavior::Succeed,
            repair: Script::new(vec![Ok(SCENE.to_string())], Ok(SCENE.to_string())),
            generate_panics: false,
            repair_panics: false,
            generate_calls: AtomicUsize::new(0),
            align_calls: AtomicUsize::new(0),
            repair_calls: AtomicUsize::new(0),
            repair_errors: Mutex::new(Vec::new()),
        }
    }

    pub fn generating(mut self, outcomes: Vec<Result<Generated, String>>) -> Self {
        self.generate = Script::new(outcomes, Err("no scripted outcome".to_string()));
        self
    }

    pub fn failing_generate(self, reason: &str) -> Self {
        self.generating(vec![Err(reason.to_string())])
    }

    pub fn without_narration(self) -> Self {
        self.generating(vec![Ok(Generated {
            artifact: SCENE.to_string(),
            narration: None,
        })])
    }

    pub fn crashing_generate(mut self) -> Self {
        self.generate_panics = true;
        self
    }

    pub fn crashing_repair(mut self) -> Self {
        self.repair_panics = true;
        self
    }

    pub fn aligning(mut self, behavior: Behavior) -> Self {
        self.align = behavior;
        self
    }

    pub fn repairing(mut self, outcomes: Vec<Result<String, String>>) -> Self {
        self.repair = Script::new(outcomes, Err("no scripted outcome".to_string()));
        self
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn repair_count(&self) -> usize {
        self.repair_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, _topic: &str) -> Result<Generated> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.generate_panics {
            panic!("generator crashed");
        }
        self.generate.next().map_err(|reason| anyhow!(reason))
    }

    async fn align(&self, artifact: &str) -> Result<String> {
        self.align_calls.fetch_add(1, Ordering::SeqCst);
        match &self.align {
            Behavior::Succeed => Ok(artifact.to_string()),
            Behavior::Fail(reason) => bail!("{}", reason),
            Behavior::Panic => panic!("align panicked"),
        }
    }

    async fn repair(&self, _artifact: &str, error: &str, _topic: &str) -> Result<String> {
        self.repair_calls.fetch_add(1, Ordering::SeqCst);
        self.repair_errors.lock().unwrap().push(error.to_string());
        if self.repair_panics {
            panic!("repair crashed");
        }
        self.repair.next().map_err(|reason| anyhow!(reason))
    }
}

/// Compile checker with a scripted pass/fail sequence
pub struct FakeChecker {
    outcomes: Script<Result<(), String>>,
    pub calls: AtomicUsize,
    /// Scripts seen by each check, in order
    pub checked: Mutex<Vec<PathBuf>>,
}

impl FakeChecker {
    pub fn passing() -> Self {
        Self::scripted(vec![Ok(())])
    }

    /// Fails `n` times, then passes
    pub fn failing_then_passing(n: usize) -> Self {
        let mut outcomes: Vec<Result<(), String>> = (0..n)
            .map(|i| Err(format!("SyntaxError: invalid syntax (attempt {})", i + 1)))
            .collect();
        outcomes.push(Ok(()));
        Self::scripted(outcomes)
    }

    pub fn always_failing(reason: &str) -> Self {
        Self::scripted(vec![Err(reason.to_string())])
    }

    pub fn scripted(outcomes: Vec<Result<(), String>>) -> Self {
        Self {
            outcomes: Script::new(outcomes, Ok(())),
            calls: AtomicUsize::new(0),
            checked: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompileChecker for FakeChecker {
    async fn check(&self, script: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !script.exists() {
            bail!("script not found: {}", script.display());
        }
        self.checked.lock().unwrap().push(script.to_path_buf());
        self.outcomes.next().map_err(|reason| anyhow!(reason))
    }
}

/// Renderer writing `<stem>.mp4` into the output directory
pub struct FakeRenderer {
    behavior: Behavior,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, script: &Path, output_dir: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.behavior {
            Behavior::Succeed => {
                let stem = script
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| anyhow!("bad script name"))?;
                tokio::fs::create_dir_all(output_dir).await?;
                let video = output_dir.join(format!("{}.mp4", stem));
                tokio::fs::write(&video, b"video").await?;
                Ok(video)
            }
            Behavior::Fail(reason) => bail!("{}", reason),
            Behavior::Panic => panic!("renderer crashed"),
        }
    }
}

/// Synthesizer writing `audio_<uuid>.mp3` into its own directory
pub struct FakeSynthesizer {
    behavior: Behavior,
    delay: Duration,
    audio_dir: PathBuf,
    pub calls: AtomicUsize,
    /// Text of each synthesis request
    pub texts: Mutex<Vec<String>>,
}

impl FakeSynthesizer {
    pub fn new(behavior: Behavior, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            audio_dir: audio_dir.into(),
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        tokio::time::sleep(self.delay).await;
        match &self.behavior {
            Behavior::Succeed => {
                tokio::fs::create_dir_all(&self.audio_dir).await?;
                let audio = self
                    .audio_dir
                    .join(format!("audio_{}.mp3", Uuid::new_v4().simple()));
                tokio::fs::write(&audio, text.as_bytes()).await?;
                Ok(audio)
            }
            Behavior::Fail(reason) => bail!("{}", reason),
            Behavior::Panic => panic!("synthesizer crashed"),
        }
    }
}

/// Muxer writing `final_<uuid>.mp4` into the output directory
pub struct FakeMuxer {
    behavior: Behavior,
    pub calls: AtomicUsize,
}

impl FakeMuxer {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Muxer for FakeMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output_dir: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => {
                let mut content = tokio::fs::read(video).await?;
                content.extend(tokio::fs::read(audio).await?);
                let out = output_dir.join(format!("final_{}.mp4", Uuid::new_v4().simple()));
                tokio::fs::write(&out, content).await?;
                Ok(out)
            }
            Behavior::Fail(reason) => bail!("{}", reason),
            Behavior::Panic => panic!("muxer crashed"),
        }
    }
}

/// Directories and fakes for one test
pub struct Harness {
    pub temp: TempDir,
    pub generator: Arc<FakeGenerator>,
    pub checker: Arc<FakeChecker>,
    pub renderer: Arc<FakeRenderer>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub muxer: Arc<FakeMuxer>,
    pub cache: Arc<dyn ResultCache>,
    pub journal: bool,
}

impl Harness {
    /// All fakes succeed on the first try
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let audio_dir = temp.path().join("audio");
        Self {
            generator: Arc::new(FakeGenerator::new()),
            checker: Arc::new(FakeChecker::passing()),
            renderer: Arc::new(FakeRenderer::new(Behavior::Succeed)),
            synthesizer: Arc::new(FakeSynthesizer::new(Behavior::Succeed, audio_dir)),
            muxer: Arc::new(FakeMuxer::new(Behavior::Succeed)),
            cache: Arc::new(NoCache),
            journal: true,
            temp,
        }
    }

    pub fn generator(mut self, generator: FakeGenerator) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    pub fn checker(mut self, checker: FakeChecker) -> Self {
        self.checker = Arc::new(checker);
        self
    }

    pub fn renderer(mut self, renderer: FakeRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn synthesizer(mut self, build: impl FnOnce(PathBuf) -> FakeSynthesizer) -> Self {
        self.synthesizer = Arc::new(build(self.audio_dir()));
        self
    }

    pub fn muxer(mut self, muxer: FakeMuxer) -> Self {
        self.muxer = Arc::new(muxer);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn without_journal(mut self) -> Self {
        self.journal = false;
        self
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.temp.path().join("scripts")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.temp.path().join("videos")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.temp.path().join("audio")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.temp.path().join("runs")
    }

    pub fn deps(&self) -> Dependencies {
        Dependencies {
            generator: self.generator.clone(),
            checker: self.checker.clone(),
            renderer: self.renderer.clone(),
            synthesizer: self.synthesizer.clone(),
            muxer: self.muxer.clone(),
            cache: Arc::clone(&self.cache),
            runs_dir: self.journal.then(|| self.runs_dir()),
            limits: ExecutionLimits::default(),
        }
    }

    /// Files currently in the scripts directory
    pub fn persisted_scripts(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.scripts_dir()) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// A generation result with the standard scene and narration
pub fn generated(artifact: &str) -> Result<Generated, String> {
    Ok(Generated {
        artifact: artifact.to_string(),
        narration: Some(NARRATION.to_string()),
    })
}
