use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing_test::traced_test;

use crate::collab::{
    Muxer, SceneCodeGenerator, SceneProgram, SceneRenderer, SpeechSynthesizer,
    StoryboardGenerator, TimedSegment, Transcriber,
};
use crate::config::{PipelineConfig, QualityPreset};
use crate::error::{CollabError, PipelineError};
use crate::pipeline::assembler::Assembler;
use crate::pipeline::orchestrator::{Collaborators, PipelineOrchestrator};
use crate::service::{ArtifactError, VideoService};
use crate::store::{JobState, JobStore, RequestId, SlideStatus};
use crate::storyboard::{SlideDraft, SlideSpec};

// ── Mock collaborators ────────────────────────────────────────────────────────

struct MockStoryboarder {
    /// Drafts to return; `None` simulates a malformed reply.
    drafts: Option<Vec<SlideDraft>>,
}

#[async_trait]
impl StoryboardGenerator for MockStoryboarder {
    async fn storyboard(
        &self,
        _text: &str,
        _requested_slides: usize,
    ) -> Result<Vec<SlideDraft>, CollabError> {
        match &self.drafts {
            Some(drafts) => Ok(drafts.clone()),
            None => Err(CollabError::Malformed("scripted storyboard failure".into())),
        }
    }
}

#[derive(Default)]
struct MockCoder {
    calls: AtomicU32,
    per_slide: Mutex<HashMap<usize, u32>>,
    seeds: Mutex<Vec<(usize, u64)>>,
}

#[async_trait]
impl SceneCodeGenerator for MockCoder {
    async fn scene_code(
        &self,
        spec: &SlideSpec,
        scene_class: &str,
        seed: u64,
    ) -> Result<String, CollabError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_slide
            .lock()
            .expect("coder lock")
            .entry(spec.index)
            .or_insert(0) += 1;
        self.seeds
            .lock()
            .expect("coder lock")
            .push((spec.index, seed));

        Ok(format!(
            "from manim import *\n\nconfig.random_seed = {seed}\n\n\
             class {scene_class}(Scene):\n    def construct(self):\n        \
             self.play(Create(Circle()), run_time=1.0)\n"
        ))
    }
}

impl MockCoder {
    fn calls_for(&self, slide: usize) -> u32 {
        self.per_slide
            .lock()
            .expect("coder lock")
            .get(&slide)
            .copied()
            .unwrap_or(0)
    }
}

struct MockSpeech;

#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn synthesize(&self, narration: &str, out_path: &Path) -> Result<(), CollabError> {
        if narration.trim().is_empty() {
            return Err(CollabError::Malformed("empty narration".into()));
        }
        tokio::fs::write(out_path, b"AUDIO")
            .await
            .map_err(CollabError::service)
    }
}

struct MockTranscriber;

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn align(&self, _audio_path: &Path) -> Result<Vec<TimedSegment>, CollabError> {
        Ok(vec![TimedSegment {
            start_secs: 0.0,
            end_secs: 2.0,
            text: "mock".to_owned(),
        }])
    }
}

#[derive(Default)]
struct MockRenderer {
    /// slide index → number of initial attempts that should fail.
    fail_first: HashMap<usize, u32>,
    /// slide index → artificial delay before the render finishes.
    delays: HashMap<usize, Duration>,
    /// slide index → gate that must be opened before the render finishes.
    gates: HashMap<usize, Arc<Semaphore>>,
    attempts: Mutex<HashMap<usize, u32>>,
    completion_order: Mutex<Vec<usize>>,
}

impl MockRenderer {
    fn attempts_for(&self, slide: usize) -> u32 {
        self.attempts
            .lock()
            .expect("renderer lock")
            .get(&slide)
            .copied()
            .unwrap_or(0)
    }

    fn completions(&self) -> Vec<usize> {
        self.completion_order.lock().expect("renderer lock").clone()
    }
}

#[async_trait]
impl SceneRenderer for MockRenderer {
    async fn render(
        &self,
        program: &SceneProgram,
        _cues: &[TimedSegment],
        _preset: QualityPreset,
        work_dir: &Path,
        _timeout: Duration,
    ) -> Result<PathBuf, CollabError> {
        let slide = program.slide_index;
        let attempt = {
            let mut attempts = self.attempts.lock().expect("renderer lock");
            let entry = attempts.entry(slide).or_insert(0);
            *entry += 1;
            *entry
        };

        if let Some(delay) = self.delays.get(&slide) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(gate) = self.gates.get(&slide) {
            gate.acquire()
                .await
                .map_err(CollabError::service)?
                .forget();
        }

        if attempt <= self.fail_first.get(&slide).copied().unwrap_or(0) {
            return Err(CollabError::Malformed(format!(
                "scripted render failure (slide {slide}, attempt {attempt})"
            )));
        }

        self.completion_order
            .lock()
            .expect("renderer lock")
            .push(slide);

        let clip = work_dir.join("silent.mp4");
        tokio::fs::write(&clip, format!("clip-{slide}"))
            .await
            .map_err(CollabError::service)?;
        Ok(clip)
    }
}

#[derive(Default)]
struct MockMuxer {
    concat_calls: AtomicU32,
    /// Clip lists passed to concat, in call order.
    concat_inputs: Mutex<Vec<Vec<PathBuf>>>,
}

#[async_trait]
impl Muxer for MockMuxer {
    async fn mux(&self, video: &Path, _audio: &Path, out: &Path) -> Result<(), CollabError> {
        // Narration does not change the clip bytes in the mock.
        tokio::fs::copy(video, out)
            .await
            .map_err(CollabError::service)?;
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> Result<(), CollabError> {
        self.concat_calls.fetch_add(1, Ordering::SeqCst);
        self.concat_inputs
            .lock()
            .expect("muxer lock")
            .push(clips.to_vec());

        let mut joined = Vec::new();
        for clip in clips {
            let bytes = tokio::fs::read(clip).await.map_err(CollabError::service)?;
            joined.extend_from_slice(&bytes);
            joined.push(b'|');
        }
        tokio::fs::write(out, joined)
            .await
            .map_err(CollabError::service)
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, CollabError> {
        let len = tokio::fs::metadata(path)
            .await
            .map_err(CollabError::service)?
            .len();
        Ok(len as f64)
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    store: JobStore,
    orchestrator: Arc<PipelineOrchestrator>,
    coder: Arc<MockCoder>,
    renderer: Arc<MockRenderer>,
    muxer: Arc<MockMuxer>,
    // Held so the workspace outlives the test.
    _work: tempfile::TempDir,
}

fn drafts(n: usize) -> Vec<SlideDraft> {
    (0..n)
        .map(|i| SlideDraft {
            narration: format!("Narration for slide {i}."),
            description: format!("Visual {i}"),
        })
        .collect()
}

fn harness(
    storyboard: Option<Vec<SlideDraft>>,
    renderer: MockRenderer,
    concurrency: usize,
) -> Harness {
    let work = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig {
        slide_concurrency: concurrency,
        work_root: work.path().to_path_buf(),
        ..PipelineConfig::default()
    };

    let coder = Arc::new(MockCoder::default());
    let renderer = Arc::new(renderer);
    let muxer = Arc::new(MockMuxer::default());

    let collab = Collaborators {
        storyboarder: Arc::new(MockStoryboarder { drafts: storyboard }),
        coder: Arc::clone(&coder) as Arc<dyn SceneCodeGenerator>,
        speech: Arc::new(MockSpeech),
        transcriber: Arc::new(MockTranscriber),
        renderer: Arc::clone(&renderer) as Arc<dyn SceneRenderer>,
        muxer: Arc::clone(&muxer) as Arc<dyn Muxer>,
    };

    let store = JobStore::new();
    let orchestrator = Arc::new(PipelineOrchestrator::new(config, collab, store.clone()));

    Harness {
        store,
        orchestrator,
        coder,
        renderer,
        muxer,
        _work: work,
    }
}

impl Harness {
    /// Submit a request the way the service does and return its id.
    async fn submit(&self, text: &str) -> RequestId {
        let id = self.store.create(text.to_owned()).await;
        let orchestrator = Arc::clone(&self.orchestrator);
        let text = text.to_owned();
        tokio::spawn(async move {
            orchestrator.run(id, text).await;
        });
        id
    }

    async fn wait_terminal(&self, id: RequestId) -> JobState {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let view = self.store.status(id).await.expect("record should exist");
                if view.state.is_terminal() {
                    break view.state;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("request should reach a terminal state within 5 s")
    }
}

// ── Happy path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_slides_complete_in_index_order() {
    let h = harness(Some(drafts(3)), MockRenderer::default(), 2);
    let id = h.submit("some lesson text").await;

    let state = h.wait_terminal(id).await;
    let JobState::Completed { artifact } = state else {
        panic!("expected Completed, got {state:?}");
    };
    assert!(artifact.ends_with("final_lesson.mp4"));

    // Exactly one concat over clips 0, 1, 2 in index order.
    assert_eq!(h.muxer.concat_calls.load(Ordering::SeqCst), 1);
    let inputs = h.muxer.concat_inputs.lock().expect("muxer lock").clone();
    let contents_in_order: Vec<String> = {
        let mut out = Vec::new();
        for clip in &inputs[0] {
            out.push(std::fs::read_to_string(clip).expect("clip should be readable"));
        }
        out
    };
    assert_eq!(contents_in_order, vec!["clip-0", "clip-1", "clip-2"]);

    // Every slide succeeded on its first attempt.
    let view = h.store.status(id).await.expect("record should exist");
    for slide in &view.slides {
        assert!(
            matches!(slide, SlideStatus::SlideSucceeded { attempts: 1 }),
            "unexpected slide status {slide:?}"
        );
    }
}

#[tokio::test]
async fn artifact_order_ignores_completion_order() {
    // Later slides finish first: slide 0 is slowest, slide 2 fastest.
    let renderer = MockRenderer {
        delays: HashMap::from([
            (0, Duration::from_millis(120)),
            (1, Duration::from_millis(60)),
            (2, Duration::from_millis(0)),
        ]),
        ..MockRenderer::default()
    };
    let h = harness(Some(drafts(3)), renderer, 3);
    let id = h.submit("ordering test").await;

    let state = h.wait_terminal(id).await;
    assert!(matches!(state, JobState::Completed { .. }), "got {state:?}");

    assert_eq!(
        h.renderer.completions(),
        vec![2, 1, 0],
        "test premise: completion order should be reversed"
    );

    let inputs = h.muxer.concat_inputs.lock().expect("muxer lock").clone();
    let names: Vec<String> = inputs[0]
        .iter()
        .map(|p| std::fs::read_to_string(p).expect("clip should be readable"))
        .collect();
    assert_eq!(names, vec!["clip-0", "clip-1", "clip-2"]);
}

#[tokio::test]
async fn single_slide_request_completes_without_concat() {
    let h = harness(Some(drafts(1)), MockRenderer::default(), 2);
    let id = h.submit("one slide").await;

    let state = h.wait_terminal(id).await;
    let JobState::Completed { artifact } = state else {
        panic!("expected Completed, got {state:?}");
    };
    assert_eq!(h.muxer.concat_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        std::fs::read_to_string(artifact).expect("artifact should exist"),
        "clip-0"
    );
}

// ── Retry behavior ────────────────────────────────────────────────────────────

#[tokio::test]
async fn slide_succeeds_on_final_attempt() {
    // Slide 1 fails twice then succeeds on attempt 3; slides 0 and 2 pass
    // on the first attempt.
    let renderer = MockRenderer {
        fail_first: HashMap::from([(1, 2)]),
        ..MockRenderer::default()
    };
    let h = harness(Some(drafts(3)), renderer, 2);
    let id = h.submit("retry test").await;

    let state = h.wait_terminal(id).await;
    assert!(matches!(state, JobState::Completed { .. }), "got {state:?}");

    assert_eq!(h.renderer.attempts_for(1), 3);
    assert_eq!(h.renderer.attempts_for(0), 1);
    assert_eq!(h.renderer.attempts_for(2), 1);

    // The program was regenerated for every attempt, not reused.
    assert_eq!(h.coder.calls_for(1), 3);

    let view = h.store.status(id).await.expect("record should exist");
    assert!(matches!(
        view.slides[1],
        SlideStatus::SlideSucceeded { attempts: 3 }
    ));
}

#[tokio::test]
#[traced_test]
async fn exhausted_slide_fails_after_exactly_cap_attempts() {
    let renderer = MockRenderer {
        fail_first: HashMap::from([(0, u32::MAX)]),
        ..MockRenderer::default()
    };
    let h = harness(Some(drafts(1)), renderer, 1);
    let id = h.submit("always failing").await;

    let state = h.wait_terminal(id).await;
    assert!(matches!(state, JobState::Failed { .. }), "got {state:?}");

    // Exactly cap attempts, never more, each with a fresh program.
    assert_eq!(h.renderer.attempts_for(0), 3);
    assert_eq!(h.coder.calls_for(0), 3);
}

#[tokio::test]
async fn regeneration_uses_distinct_seeds_per_attempt() {
    let renderer = MockRenderer {
        fail_first: HashMap::from([(0, u32::MAX)]),
        ..MockRenderer::default()
    };
    let h = harness(Some(drafts(1)), renderer, 1);
    let id = h.submit("seed test").await;
    h.wait_terminal(id).await;

    let seeds: Vec<u64> = h
        .coder
        .seeds
        .lock()
        .expect("coder lock")
        .iter()
        .filter(|(slide, _)| *slide == 0)
        .map(|(_, seed)| *seed)
        .collect();
    assert_eq!(seeds, vec![42, 43, 44]);
}

#[tokio::test]
async fn failing_slide_set_is_exact_and_assembler_never_runs() {
    // Slide 1 of 3 fails permanently; the others succeed.
    let renderer = MockRenderer {
        fail_first: HashMap::from([(1, u32::MAX)]),
        ..MockRenderer::default()
    };
    let h = harness(Some(drafts(3)), renderer, 2);
    let id = h.submit("partial failure").await;

    let state = h.wait_terminal(id).await;
    let JobState::Failed {
        error,
        failed_slides,
    } = state
    else {
        panic!("expected Failed, got {state:?}");
    };

    let indices: Vec<usize> = failed_slides.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![1]);
    assert!(matches!(error, PipelineError::Execution { slide: 1, .. }));

    // No partial artifact: the assembler was never invoked.
    assert_eq!(h.muxer.concat_calls.load(Ordering::SeqCst), 0);

    // The healthy slides still ran to success; no early exit.
    let view = h.store.status(id).await.expect("record should exist");
    assert!(matches!(view.slides[0], SlideStatus::SlideSucceeded { .. }));
    assert!(matches!(view.slides[2], SlideStatus::SlideSucceeded { .. }));
    assert!(matches!(view.slides[1], SlideStatus::SlideFailed { .. }));
}

// ── Storyboard failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn empty_storyboard_fails_before_any_slide_work() {
    let h = harness(Some(Vec::new()), MockRenderer::default(), 2);
    let id = h.submit("unusable text").await;

    let state = h.wait_terminal(id).await;
    let JobState::Failed { error, .. } = state else {
        panic!("expected Failed, got {state:?}");
    };
    assert!(matches!(error, PipelineError::Storyboard { .. }));

    assert_eq!(h.coder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.renderer.attempts_for(0), 0);
}

#[tokio::test]
async fn oversized_storyboard_is_a_storyboard_error() {
    let h = harness(Some(drafts(9)), MockRenderer::default(), 2);
    let id = h.submit("too many slides").await;

    let state = h.wait_terminal(id).await;
    let JobState::Failed { error, .. } = state else {
        panic!("expected Failed, got {state:?}");
    };
    assert!(matches!(error, PipelineError::Storyboard { .. }));
    assert_eq!(h.coder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_storyboard_reply_is_a_storyboard_error() {
    let h = harness(None, MockRenderer::default(), 2);
    let id = h.submit("text").await;

    let state = h.wait_terminal(id).await;
    let JobState::Failed { error, .. } = state else {
        panic!("expected Failed, got {state:?}");
    };
    assert!(matches!(error, PipelineError::Storyboard { .. }));
}

// ── Cancellation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_between_slides_stops_further_attempts() {
    // Sequential processing; both renders block on gates so the test can
    // cancel while exactly one slide is mid-attempt and the other has not
    // started.  Which slide runs first is up to the scheduler.
    let gate_a = Arc::new(Semaphore::new(0));
    let gate_b = Arc::new(Semaphore::new(0));
    let renderer = MockRenderer {
        gates: HashMap::from([(0, Arc::clone(&gate_a)), (1, Arc::clone(&gate_b))]),
        ..MockRenderer::default()
    };
    let h = harness(Some(drafts(2)), renderer, 1);
    let id = h.submit("cancel me").await;

    // Wait until one slide is mid-attempt; with concurrency 1 the other is
    // still waiting for its permit.
    let running = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = h.store.status(id).await.expect("record should exist");
            let attempting = view
                .slides
                .iter()
                .position(|s| matches!(s, SlideStatus::SlideAttempting { .. }));
            if let Some(index) = attempting {
                break index;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("a slide should start within 5 s");

    assert!(h.store.request_cancel(id).await);
    if running == 0 {
        gate_a.add_permits(1);
    } else {
        gate_b.add_permits(1);
    }

    let state = h.wait_terminal(id).await;
    assert!(matches!(state, JobState::Cancelled), "got {state:?}");

    // The slide that had not started never attempted anything.
    let idle = 1 - running;
    assert_eq!(h.coder.calls_for(idle), 0);
    assert_eq!(h.renderer.attempts_for(idle), 0);

    // The record is immutable afterwards.
    assert!(
        !h.store
            .set_state(
                id,
                JobState::Completed {
                    artifact: PathBuf::from("late.mp4")
                }
            )
            .await
    );
    assert!(!h.store.request_cancel(id).await);
    let view = h.store.status(id).await.expect("record should exist");
    assert!(matches!(view.state, JobState::Cancelled));
}

// ── Assembler ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn assembler_rerun_is_byte_identical() {
    let work = tempfile::tempdir().expect("tempdir");
    let clips: Vec<(usize, PathBuf)> = (0..3)
        .map(|i| {
            let path = work.path().join(format!("clip_{i}.mp4"));
            std::fs::write(&path, format!("clip-{i}")).expect("write clip");
            (i, path)
        })
        .collect();

    let assembler = Assembler::new(Arc::new(MockMuxer::default()));

    let first_out = work.path().join("first.mp4");
    let second_out = work.path().join("second.mp4");
    assembler
        .assemble(&clips, &first_out)
        .await
        .expect("first assembly should succeed");
    assembler
        .assemble(&clips, &second_out)
        .await
        .expect("second assembly should succeed");

    let first = std::fs::read(&first_out).expect("first artifact");
    let second = std::fs::read(&second_out).expect("second artifact");
    assert_eq!(first, second, "re-assembly must be idempotent");
}

#[tokio::test]
async fn assembler_rejects_missing_clip_file() {
    let work = tempfile::tempdir().expect("tempdir");
    let present = work.path().join("clip_0.mp4");
    std::fs::write(&present, "clip-0").expect("write clip");
    let missing = work.path().join("clip_1.mp4");

    let assembler = Assembler::new(Arc::new(MockMuxer::default()));
    let err = assembler
        .assemble(
            &[(0, present), (1, missing)],
            &work.path().join("out.mp4"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Assembly { .. }));
}

// ── Service facade ────────────────────────────────────────────────────────────

fn facade(storyboard: Option<Vec<SlideDraft>>, work: &tempfile::TempDir) -> VideoService {
    let config = PipelineConfig {
        work_root: work.path().to_path_buf(),
        ..PipelineConfig::default()
    };
    let collab = Collaborators {
        storyboarder: Arc::new(MockStoryboarder { drafts: storyboard }),
        coder: Arc::new(MockCoder::default()),
        speech: Arc::new(MockSpeech),
        transcriber: Arc::new(MockTranscriber),
        renderer: Arc::new(MockRenderer::default()),
        muxer: Arc::new(MockMuxer::default()),
    };
    VideoService::new(config, collab)
}

#[tokio::test]
async fn artifact_is_available_iff_completed() {
    let work = tempfile::tempdir().expect("tempdir");
    let service = facade(Some(drafts(2)), &work);

    let id = service
        .submit("lesson text".to_owned())
        .await
        .expect("submit should succeed");

    // Unknown id → NotFound, in-flight id → NotReady.
    assert!(matches!(
        service.artifact(uuid::Uuid::new_v4()).await,
        Err(ArtifactError::NotFound)
    ));

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = service.status(id).await.expect("record should exist");
            match view.state {
                JobState::Completed { .. } => break true,
                ref s if s.is_terminal() => break false,
                _ => {
                    if let Err(ArtifactError::NotFound) = service.artifact(id).await {
                        panic!("in-flight request must not report NotFound");
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    })
    .await
    .expect("request should finish within 5 s");
    assert!(completed, "request should complete");

    let artifact = service
        .artifact(id)
        .await
        .expect("artifact should be ready once completed");
    assert!(artifact.exists());
}

#[tokio::test]
async fn blank_submission_is_rejected() {
    let work = tempfile::tempdir().expect("tempdir");
    let service = facade(Some(drafts(1)), &work);
    let err = service.submit("   ".to_owned()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storyboard { .. }));
}

#[tokio::test]
async fn cancel_on_unknown_request_is_rejected() {
    let work = tempfile::tempdir().expect("tempdir");
    let service = facade(Some(drafts(1)), &work);
    assert!(!service.cancel(uuid::Uuid::new_v4()).await);
}
