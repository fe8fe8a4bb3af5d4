use std::path::PathBuf;
use std::time::Duration;

/// Fixed render quality preset shared by the renderer and the assembler.
///
/// Every slide of every request renders at the same preset so that the
/// final concatenation can join clips without re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreset {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl QualityPreset {
    /// Low-latency preview preset: 640×480 at 24 fps.
    pub const LOW_LATENCY: QualityPreset = QualityPreset {
        width: 640,
        height: 480,
        frame_rate: 24,
    };

    /// Directory tag the renderer uses for its output tree, e.g. `480p24`.
    pub fn dir_tag(&self) -> String {
        format!("{}p{}", self.height, self.frame_rate)
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.frame_rate)
    }
}

/// Immutable pipeline configuration, passed into the orchestrator at
/// construction.  Nothing here is ambient or mutable at runtime.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base seed for reproducible generation.  The per-attempt seed is
    /// derived via [`PipelineConfig::attempt_seed`].
    pub base_seed: u64,

    /// Maximum attempts per slide before it is marked permanently failed.
    pub attempt_cap: u32,

    /// Hard upper bound on accepted storyboard length.
    pub max_slides: usize,

    /// Slide count requested from the storyboard collaborator (may be lower
    /// than `max_slides`; the collaborator is asked to stay within it).
    pub requested_slides: usize,

    /// Maximum slides rendered concurrently within one request.
    pub slide_concurrency: usize,

    /// Render quality preset for every clip.
    pub quality: QualityPreset,

    /// Timeout for a single storyboard or scene-code generation call.
    pub generation_timeout: Duration,

    /// Timeout for a single speech-synthesis call.
    pub synthesis_timeout: Duration,

    /// Timeout for a single transcription call.
    pub transcription_timeout: Duration,

    /// Wall-clock budget for a single render; the renderer kills the
    /// process when it is exceeded.
    pub render_timeout: Duration,

    /// Root directory for per-request workspaces and final artifacts.
    pub work_root: PathBuf,
}

impl PipelineConfig {
    /// Seed for the given attempt (1-based).
    ///
    /// Attempt 1 always uses the base seed, so a clean run is reproducible;
    /// each retry shifts the seed deterministically so that a failed
    /// generation is not repeated verbatim.
    pub fn attempt_seed(&self, attempt: u32) -> u64 {
        self.base_seed.wrapping_add(u64::from(attempt.saturating_sub(1)))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_seed: 42,
            attempt_cap: 3,
            max_slides: 8,
            requested_slides: 5,
            slide_concurrency: 2,
            quality: QualityPreset::LOW_LATENCY,
            generation_timeout: Duration::from_secs(120),
            synthesis_timeout: Duration::from_secs(60),
            transcription_timeout: Duration::from_secs(120),
            render_timeout: Duration::from_secs(300),
            work_root: PathBuf::from("slidecast-work"),
        }
    }
}
