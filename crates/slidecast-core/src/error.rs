use thiserror::Error;

/// Errors produced by the video pipeline.
///
/// Each variant names the stage that failed.  Per-attempt errors
/// (`Generation`, `Synthesis`, `Transcription`, `Execution`) are recovered
/// locally by the slide retry loop up to the attempt cap; `Storyboard` and
/// `Assembly` errors are always fatal to the request.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The storyboard collaborator returned malformed output or a slide
    /// count outside the accepted bound.
    #[error("storyboard generation failed: {message}")]
    Storyboard { message: String },

    /// The code-generation collaborator returned empty, malformed, or
    /// structurally incomplete animation source.
    #[error("scene generation failed for slide {slide}: {message}")]
    Generation { slide: usize, message: String },

    /// The speech-synthesis collaborator failed to produce narration audio.
    #[error("speech synthesis failed for slide {slide}: {message}")]
    Synthesis { slide: usize, message: String },

    /// The transcription collaborator failed to produce timing cues.
    #[error("transcription failed for slide {slide}: {message}")]
    Transcription { slide: usize, message: String },

    /// The renderer crashed, rejected the program, timed out, or the
    /// narration could not be muxed into the rendered clip.
    #[error("render execution failed for slide {slide}: {message}")]
    Execution { slide: usize, message: String },

    /// The final clip set was incomplete or could not be concatenated.
    #[error("assembly failed: {message}")]
    Assembly { message: String },

    /// The request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Short stable tag for the failing stage, used in status reporting.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Storyboard { .. } => "storyboard",
            PipelineError::Generation { .. } => "generation",
            PipelineError::Synthesis { .. } => "synthesis",
            PipelineError::Transcription { .. } => "transcription",
            PipelineError::Execution { .. } => "execution",
            PipelineError::Assembly { .. } => "assembly",
            PipelineError::Cancelled => "cancelled",
        }
    }

    /// Returns `true` if this error may be retried within a slide's
    /// attempt budget.  Storyboard and assembly failures are request-fatal.
    pub fn is_attempt_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::Generation { .. }
                | PipelineError::Synthesis { .. }
                | PipelineError::Transcription { .. }
                | PipelineError::Execution { .. }
        )
    }
}

/// Errors surfaced by collaborator implementations at the trait boundary.
///
/// Collaborators do not know which slide they are serving; the pipeline maps
/// these into the slide-tagged [`PipelineError`] variants.
#[derive(Debug, Error)]
pub enum CollabError {
    /// The collaborator returned no usable output.
    #[error("collaborator returned empty output")]
    EmptyOutput,

    /// The collaborator returned output that failed to parse or validate.
    #[error("malformed collaborator output: {0}")]
    Malformed(String),

    /// The underlying service call failed (network, process spawn, I/O).
    #[error("collaborator call failed: {0}")]
    Service(#[source] anyhow::Error),
}

impl CollabError {
    pub fn service(err: impl Into<anyhow::Error>) -> Self {
        CollabError::Service(err.into())
    }
}
