//! Collaborator boundary: the narrow async interfaces through which the
//! pipeline consumes external generation and media tools, plus their
//! production implementations.
//!
//! The pipeline never assumes a collaborator retries internally; every call
//! is a single timeout-bounded operation from the caller's point of view.

mod llm;
mod media;
mod render;
mod speech;
mod transcribe;

pub use llm::{LlmSceneCoder, LlmStoryboarder};
pub use media::FfmpegMuxer;
pub use render::ManimRenderer;
pub use speech::HttpSpeechSynthesizer;
pub use transcribe::HttpTranscriber;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::QualityPreset;
use crate::error::CollabError;
use crate::storyboard::{SlideDraft, SlideSpec};

/// One timed narration segment, used to pace the animation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimedSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// A candidate animation program produced by the slide compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneProgram {
    pub slide_index: usize,
    /// Scene class the renderer is told to execute, e.g. `Slide0`.
    pub scene_class: String,
    pub source: String,
    /// Seed the program was generated with, for diagnostics.
    pub seed: u64,
}

/// Turns input text into an ordered storyboard of slide drafts.
#[async_trait]
pub trait StoryboardGenerator: Send + Sync {
    /// `requested_slides` is a soft target passed to the generator; the
    /// caller enforces the hard bound afterwards.
    async fn storyboard(
        &self,
        text: &str,
        requested_slides: usize,
    ) -> Result<Vec<SlideDraft>, CollabError>;
}

/// Turns one slide spec into animation source code.
#[async_trait]
pub trait SceneCodeGenerator: Send + Sync {
    /// Must be a pure function of its arguments: the same (spec, seed) pair
    /// yields the same program, and no state is carried between calls.
    async fn scene_code(
        &self,
        spec: &SlideSpec,
        scene_class: &str,
        seed: u64,
    ) -> Result<String, CollabError>;
}

/// Produces a narration audio file from text.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, narration: &str, out_path: &Path) -> Result<(), CollabError>;
}

/// Aligns narration audio to timed segments.  A fast, low-accuracy model
/// variant is acceptable; timing matters more than transcript fidelity.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn align(&self, audio_path: &Path) -> Result<Vec<TimedSegment>, CollabError>;
}

/// Executes an animation program into a silent video clip.
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    /// Renders into `work_dir` and returns the clip path.  Implementations
    /// must terminate the render when `timeout` elapses rather than leaving
    /// it running.
    async fn render(
        &self,
        program: &SceneProgram,
        cues: &[TimedSegment],
        preset: QualityPreset,
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, CollabError>;
}

/// Combines and concatenates media files without re-encoding video.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Mux a narration track into a silent clip.
    async fn mux(&self, video: &Path, audio: &Path, out: &Path) -> Result<(), CollabError>;

    /// Concatenate clips in the given order with a copy-level join.
    /// All inputs must share codec parameters.
    async fn concat(&self, clips: &[PathBuf], out: &Path) -> Result<(), CollabError>;

    /// Duration of a media file in seconds; fails if the file is unreadable.
    async fn probe_duration(&self, path: &Path) -> Result<f64, CollabError>;
}
