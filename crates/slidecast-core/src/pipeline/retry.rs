use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::pipeline::attempt::AttemptRunner;
use crate::pipeline::compiler::SlideCompiler;
use crate::store::{JobStore, RequestId, SlideStatus};
use crate::storyboard::SlideSpec;

/// Diagnostic record of one attempt, retained for status reporting.
#[derive(Debug, Clone)]
pub struct SlideAttempt {
    pub slide: usize,
    pub attempt: u32,
    /// Generated program source, if compilation got that far.
    pub source: Option<String>,
    /// `None` on success.
    pub failure: Option<String>,
}

/// Terminal outcome of one slide.
#[derive(Debug, Clone)]
pub enum SlideOutcome {
    Succeeded { clip: PathBuf },
    PermanentlyFailed { reason: PipelineError },
    /// The request was cancelled before this slide finished.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SlideResult {
    pub index: usize,
    pub outcome: SlideOutcome,
    pub attempts: Vec<SlideAttempt>,
}

impl SlideResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, SlideOutcome::Succeeded { .. })
    }
}

/// Bounded retry loop around compile + render for one slide.
///
/// Each attempt regenerates the program from scratch with a fresh
/// attempt-derived seed; nothing from a failed attempt is reused.  After
/// `cap` failed attempts the slide is permanently failed with the last
/// failure reason.
pub struct SlideRetryController<'a> {
    compiler: &'a SlideCompiler,
    runner: &'a AttemptRunner,
    cap: u32,
}

impl<'a> SlideRetryController<'a> {
    pub fn new(compiler: &'a SlideCompiler, runner: &'a AttemptRunner, cap: u32) -> Self {
        Self {
            compiler,
            runner,
            cap,
        }
    }

    /// Drive `spec` to a terminal outcome, reporting per-attempt progress
    /// into the job store.
    ///
    /// `slide_dir` must be exclusive to this slide; each attempt works in
    /// its own `attempt_N` subdirectory.  `cancel_rx` is observed before
    /// each attempt; cancellation never interrupts a clip mid-write.
    pub async fn run(
        &self,
        spec: &SlideSpec,
        slide_dir: &Path,
        cancel_rx: tokio::sync::watch::Receiver<bool>,
        store: &JobStore,
        request_id: RequestId,
    ) -> SlideResult {
        let mut attempts: Vec<SlideAttempt> = Vec::new();

        for attempt in 1..=self.cap {
            if *cancel_rx.borrow() {
                info!(slide = spec.index, attempt, "cancelled before attempt");
                return SlideResult {
                    index: spec.index,
                    outcome: SlideOutcome::Cancelled,
                    attempts,
                };
            }

            store
                .set_slide(request_id, spec.index, SlideStatus::SlideAttempting { attempt })
                .await;

            let attempt_dir = slide_dir.join(format!("attempt_{attempt}"));
            match self.run_one(spec, attempt, &attempt_dir).await {
                Ok((clip, source)) => {
                    attempts.push(SlideAttempt {
                        slide: spec.index,
                        attempt,
                        source: Some(source),
                        failure: None,
                    });
                    info!(slide = spec.index, attempt, "slide rendered");
                    return SlideResult {
                        index: spec.index,
                        outcome: SlideOutcome::Succeeded { clip },
                        attempts,
                    };
                }
                Err((error, source)) => {
                    warn!(
                        slide = spec.index,
                        attempt,
                        cap = self.cap,
                        error = %error,
                        "attempt failed"
                    );
                    attempts.push(SlideAttempt {
                        slide: spec.index,
                        attempt,
                        source,
                        failure: Some(error.to_string()),
                    });

                    if attempt == self.cap {
                        return SlideResult {
                            index: spec.index,
                            outcome: SlideOutcome::PermanentlyFailed { reason: error },
                            attempts,
                        };
                    }
                }
            }
        }

        // cap >= 1 means the loop always returns; this is unreachable with
        // a valid configuration.
        SlideResult {
            index: spec.index,
            outcome: SlideOutcome::PermanentlyFailed {
                reason: PipelineError::Execution {
                    slide: spec.index,
                    message: "attempt cap is zero".to_owned(),
                },
            },
            attempts,
        }
    }

    /// One compile + render cycle.  Returns the clip and the program source
    /// on success, or the error plus whatever source was generated.
    async fn run_one(
        &self,
        spec: &SlideSpec,
        attempt: u32,
        attempt_dir: &Path,
    ) -> Result<(PathBuf, String), (PipelineError, Option<String>)> {
        let program = self
            .compiler
            .compile(spec, attempt)
            .await
            .map_err(|e| (e, None))?;

        let source = program.source.clone();
        match self.runner.run(&program, &spec.narration, attempt_dir).await {
            Ok(clip) => Ok((clip, source)),
            Err(e) => Err((e, Some(source))),
        }
    }
}
