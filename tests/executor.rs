//! Executor Integration Tests
//!
//! Drives small hand-built graphs through the executor: visit budget,
//! fan-out barrier, branch merge order and journal output.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use animathics::core::{
    EventStore, ExecutionLimits, Executor, Field, Graph, Next, Node, NodeId, PipelineState,
    StatePatch,
};
use animathics::domain::{EventType, PipelineError, RunState};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Barrier;
use uuid::Uuid;

fn initial() -> PipelineState {
    PipelineState::new("circle", "/tmp/scripts", "/tmp/videos")
}

/// Writes the artifact and counts its visits
struct Start {
    visits: AtomicU32,
}

#[async_trait]
impl Node for Start {
    fn name(&self) -> NodeId {
        "start"
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::Artifact]
    }

    async fn run(&self, _state: &PipelineState) -> StatePatch {
        let n = self.visits.fetch_add(1, Ordering::SeqCst) + 1;
        StatePatch::empty().with_artifact(format!("draft {}", n))
    }
}

/// Fan-out branch writing a fixed video path after a delay
struct VideoBranch {
    delay: Duration,
    barrier: Option<Arc<Barrier>>,
}

#[async_trait]
impl Node for VideoBranch {
    fn name(&self) -> NodeId {
        "video"
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::VideoPath, Field::RenderError]
    }

    async fn run(&self, _state: &PipelineState) -> StatePatch {
        if let Some(ref barrier) = self.barrier {
            barrier.wait().await;
        }
        tokio::time::sleep(self.delay).await;
        StatePatch::empty().with_video_path("/tmp/videos/scene.mp4")
    }
}

/// Fan-out branch writing a fixed audio path after a delay
struct AudioBranch {
    delay: Duration,
    barrier: Option<Arc<Barrier>>,
    panics: bool,
}

#[async_trait]
impl Node for AudioBranch {
    fn name(&self) -> NodeId {
        "audio"
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::AudioPath, Field::AudioError]
    }

    async fn run(&self, _state: &PipelineState) -> StatePatch {
        if let Some(ref barrier) = self.barrier {
            barrier.wait().await;
        }
        tokio::time::sleep(self.delay).await;
        if self.panics {
            panic!("audio branch crashed");
        }
        StatePatch::empty().with_audio_path("/tmp/audio/voice.mp3")
    }
}

/// Join target that marks the run complete when both paths arrived
struct Finish;

#[async_trait]
impl Node for Finish {
    fn name(&self) -> NodeId {
        "finish"
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::FinalPath, Field::Completed]
    }

    async fn run(&self, state: &PipelineState) -> StatePatch {
        match (&state.video_path, &state.audio_path) {
            (Some(_), Some(_)) => StatePatch::empty()
                .with_final_path(PathBuf::from("/tmp/videos/final.mp4"))
                .with_completed(true),
            _ => StatePatch::empty(),
        }
    }
}

/// Sequential node that panics on every visit
struct Crash;

#[async_trait]
impl Node for Crash {
    fn name(&self) -> NodeId {
        "crash"
    }

    fn owned_fields(&self) -> &'static [Field] {
        &[Field::Artifact, Field::Error]
    }

    async fn run(&self, _state: &PipelineState) -> StatePatch {
        panic!("node crashed");
    }
}

fn fan_out_graph(video: VideoBranch, audio: AudioBranch) -> Arc<Graph> {
    let graph = Graph::builder()
        .node(Arc::new(Start {
            visits: AtomicU32::new(0),
        }))
        .node(Arc::new(video))
        .node(Arc::new(audio))
        .node(Arc::new(Finish))
        .entry("start")
        .route("start", |_: &PipelineState| Next::Parallel(vec!["video", "audio"]))
        .join(&["video", "audio"], "finish")
        .build()
        .unwrap();
    Arc::new(graph)
}

fn branches(video_ms: u64, audio_ms: u64) -> (VideoBranch, AudioBranch) {
    (
        VideoBranch {
            delay: Duration::from_millis(video_ms),
            barrier: None,
        },
        AudioBranch {
            delay: Duration::from_millis(audio_ms),
            barrier: None,
            panics: false,
        },
    )
}

#[tokio::test]
async fn test_fan_out_merges_both_branches() {
    let (video, audio) = branches(0, 0);
    let state = Executor::new(fan_out_graph(video, audio)).run(initial()).await;

    assert_eq!(state.error, None);
    assert!(state.completed);
    assert_eq!(state.video_path, Some(PathBuf::from("/tmp/videos/scene.mp4")));
    assert_eq!(state.audio_path, Some(PathBuf::from("/tmp/audio/voice.mp3")));
    assert_eq!(state.final_path, Some(PathBuf::from("/tmp/videos/final.mp4")));
}

#[tokio::test]
async fn test_fan_out_result_independent_of_completion_order() {
    let (video, audio) = branches(40, 0);
    let video_last = Executor::new(fan_out_graph(video, audio)).run(initial()).await;

    let (video, audio) = branches(0, 40);
    let audio_last = Executor::new(fan_out_graph(video, audio)).run(initial()).await;

    assert_eq!(video_last, audio_last);
}

#[tokio::test]
async fn test_branches_run_concurrently() {
    // Each branch waits for the other; sequential execution would hang
    let barrier = Arc::new(Barrier::new(2));
    let video = VideoBranch {
        delay: Duration::ZERO,
        barrier: Some(Arc::clone(&barrier)),
    };
    let audio = AudioBranch {
        delay: Duration::ZERO,
        barrier: Some(barrier),
        panics: false,
    };

    let executor = Executor::new(fan_out_graph(video, audio));
    let state = tokio::time::timeout(Duration::from_secs(5), executor.run(initial()))
        .await
        .expect("branches did not run concurrently");

    assert!(state.completed);
}

#[tokio::test]
async fn test_panicking_branch_uses_failure_patch() {
    let video = VideoBranch {
        delay: Duration::ZERO,
        barrier: None,
    };
    let audio = AudioBranch {
        delay: Duration::ZERO,
        barrier: None,
        panics: true,
    };

    let state = Executor::new(fan_out_graph(video, audio)).run(initial()).await;

    // Default failure patch records a step error for the branch
    match state.error {
        Some(PipelineError::Step { ref node, ref reason }) => {
            assert_eq!(node, "audio");
            assert!(reason.contains("branch task failed"));
        }
        ref other => panic!("expected step error, got {:?}", other),
    }
    assert!(state.video_path.is_some());
    assert!(state.audio_path.is_none());
    assert!(!state.completed);
}

#[tokio::test]
async fn test_visit_budget_stops_runaway_loop() {
    let start = Arc::new(Start {
        visits: AtomicU32::new(0),
    });
    let graph = Graph::builder()
        .node(start.clone())
        .entry("start")
        .route("start", |_: &PipelineState| Next::Single("start"))
        .build()
        .unwrap();

    let temp = TempDir::new().unwrap();
    let journal = EventStore::open_in(temp.path(), Uuid::new_v4()).await.unwrap();

    let executor = Executor::new(Arc::new(graph))
        .with_limits(ExecutionLimits {
            max_node_visits: 5,
            ..Default::default()
        })
        .with_journal(journal.clone());
    let state = executor.run(initial()).await;

    assert!(matches!(state.error, Some(PipelineError::LimitExceeded { .. })));
    assert_eq!(start.visits.load(Ordering::SeqCst), 5);
    assert_eq!(state.artifact.as_deref(), Some("draft 5"));

    let run = journal.summary().await.unwrap().unwrap();
    assert!(matches!(run.state, RunState::LimitReached { .. }));
    assert_eq!(run.node_visits, 5);

    // Limit runs are not also journaled as failures
    let failed = journal
        .find_events(|e| e.event_type == EventType::RunFailed)
        .await
        .unwrap();
    assert!(failed.is_empty());
}

#[tokio::test]
async fn test_panicking_node_becomes_step_error() {
    let start = Arc::new(Start {
        visits: AtomicU32::new(0),
    });
    let graph = Graph::builder()
        .node(start.clone())
        .node(Arc::new(Crash))
        .entry("start")
        .edge("start", "crash")
        .build()
        .unwrap();

    let temp = TempDir::new().unwrap();
    let journal = EventStore::open_in(temp.path(), Uuid::new_v4()).await.unwrap();

    let executor = Executor::new(Arc::new(graph)).with_journal(journal.clone());
    let state = executor.run(initial()).await;

    match state.error {
        Some(PipelineError::Step { ref node, ref reason }) => {
            assert_eq!(node, "crash");
            assert!(reason.contains("node task failed"));
        }
        ref other => panic!("expected step error, got {:?}", other),
    }
    // Earlier patches survive the crash
    assert_eq!(state.artifact.as_deref(), Some("draft 1"));

    let failed = journal
        .find_events(|e| e.event_type == EventType::NodeFailed)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].node.as_deref(), Some("crash"));

    let run = journal.summary().await.unwrap().unwrap();
    assert!(matches!(run.state, RunState::Failed { .. }));
}

#[tokio::test]
async fn test_fan_out_needs_budget_for_every_branch() {
    let (video, audio) = branches(0, 0);
    let executor = Executor::new(fan_out_graph(video, audio)).with_limits(ExecutionLimits {
        max_node_visits: 2,
        ..Default::default()
    });

    let state = executor.run(initial()).await;

    // start used one visit; two branches do not fit in the one left
    assert!(matches!(state.error, Some(PipelineError::LimitExceeded { .. })));
    assert_eq!(state.artifact.as_deref(), Some("draft 1"));
    assert!(state.video_path.is_none());
    assert!(state.audio_path.is_none());
    assert!(!state.completed);
}

#[tokio::test]
async fn test_router_to_unknown_node_ends_run() {
    let graph = Graph::builder()
        .node(Arc::new(Start {
            visits: AtomicU32::new(0),
        }))
        .entry("start")
        .route("start", |_: &PipelineState| Next::Single("ghost"))
        .build()
        .unwrap();

    let state = Executor::new(Arc::new(graph)).run(initial()).await;

    assert_eq!(
        state.error,
        Some(PipelineError::Step {
            node: "ghost".to_string(),
            reason: "no such node in graph".to_string()
        })
    );
    assert_eq!(state.artifact.as_deref(), Some("draft 1"));
}

#[tokio::test]
async fn test_empty_fan_out_is_terminal() {
    let graph = Graph::builder()
        .node(Arc::new(Start {
            visits: AtomicU32::new(0),
        }))
        .entry("start")
        .route("start", |_: &PipelineState| Next::Parallel(Vec::new()))
        .build()
        .unwrap();

    let state = Executor::new(Arc::new(graph)).run(initial()).await;

    assert_eq!(state.error, None);
    assert_eq!(state.artifact.as_deref(), Some("draft 1"));
}

#[tokio::test]
async fn test_journal_records_fork_and_join() {
    let temp = TempDir::new().unwrap();
    let journal = EventStore::open_in(temp.path(), Uuid::new_v4()).await.unwrap();

    let (video, audio) = branches(0, 0);
    let executor = Executor::new(fan_out_graph(video, audio)).with_journal(journal.clone());
    executor.run(initial()).await;

    let types: Vec<EventType> = journal
        .replay()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();

    let forked = types.iter().position(|t| *t == EventType::BranchesForked);
    let joined = types.iter().position(|t| *t == EventType::BranchesJoined);
    assert!(forked.is_some());
    assert!(joined.is_some());
    assert!(forked < joined);
    assert_eq!(types.first(), Some(&EventType::RunStarted));
    assert_eq!(types.last(), Some(&EventType::RunCompleted));

    let run = journal.summary().await.unwrap().unwrap();
    assert_eq!(run.state, RunState::Completed);
    // start, video, audio, finish
    assert_eq!(run.node_visits, 4);
}
