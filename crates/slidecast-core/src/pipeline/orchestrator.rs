use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::collab::{
    Muxer, SceneCodeGenerator, SceneRenderer, SpeechSynthesizer, StoryboardGenerator, Transcriber,
};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::assembler::Assembler;
use crate::pipeline::attempt::AttemptRunner;
use crate::pipeline::compiler::SlideCompiler;
use crate::pipeline::retry::{SlideOutcome, SlideResult, SlideRetryController};
use crate::store::{JobState, JobStore, RequestId, SlideFailure, SlideStatus};
use crate::storyboard::Storyboard;

/// The full set of external collaborators the pipeline depends on.
pub struct Collaborators {
    pub storyboarder: Arc<dyn StoryboardGenerator>,
    pub coder: Arc<dyn SceneCodeGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub renderer: Arc<dyn SceneRenderer>,
    pub muxer: Arc<dyn Muxer>,
}

/// Drives one request end to end: storyboard, per-slide retry loops under
/// bounded concurrency, final assembly.  Owns every write to the job store.
pub struct PipelineOrchestrator {
    storyboarder: Arc<dyn StoryboardGenerator>,
    compiler: SlideCompiler,
    runner: AttemptRunner,
    assembler: Assembler,
    config: Arc<PipelineConfig>,
    store: JobStore,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig, collab: Collaborators, store: JobStore) -> Self {
        let config = Arc::new(config);
        Self {
            storyboarder: collab.storyboarder,
            compiler: SlideCompiler::new(collab.coder, Arc::clone(&config)),
            runner: AttemptRunner::new(
                collab.speech,
                collab.transcriber,
                collab.renderer,
                Arc::clone(&collab.muxer),
                Arc::clone(&config),
            ),
            assembler: Assembler::new(collab.muxer),
            config,
            store,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one submitted request to a terminal state.
    ///
    /// Runs in its own task per request; requests share nothing but the
    /// job store.
    pub async fn run(self: Arc<Self>, request_id: RequestId, input_text: String) {
        let Some(cancel_tx) = self.store.cancel_tx(request_id).await else {
            error!(%request_id, "no job record for submitted request");
            return;
        };
        let cancel_rx = cancel_tx.subscribe();

        // ── Storyboarding ────────────────────────────────────────────────────
        if *cancel_rx.borrow() {
            self.store.set_state(request_id, JobState::Cancelled).await;
            return;
        }
        self.store
            .set_state(request_id, JobState::Storyboarding)
            .await;

        let storyboard = match self.obtain_storyboard(&input_text).await {
            Ok(sb) => sb,
            Err(error) => {
                warn!(%request_id, %error, "storyboarding failed");
                self.store
                    .set_state(
                        request_id,
                        JobState::Failed {
                            error,
                            failed_slides: Vec::new(),
                        },
                    )
                    .await;
                return;
            }
        };
        info!(%request_id, slides = storyboard.len(), "storyboard ready");

        // ── Slide processing ─────────────────────────────────────────────────
        if *cancel_rx.borrow() {
            self.store.set_state(request_id, JobState::Cancelled).await;
            return;
        }
        self.store.init_slides(request_id, storyboard.len()).await;
        self.store
            .set_state(request_id, JobState::SlideProcessing)
            .await;

        let workspace = self.config.work_root.join(request_id.to_string());
        if let Err(e) = tokio::fs::create_dir_all(&workspace).await {
            self.store
                .set_state(
                    request_id,
                    JobState::Failed {
                        error: PipelineError::Assembly {
                            message: format!("failed to create workspace: {e}"),
                        },
                        failed_slides: Vec::new(),
                    },
                )
                .await;
            return;
        }

        let results = self
            .process_slides(request_id, &storyboard, &workspace, cancel_rx.clone())
            .await;

        // Record terminal slide statuses before deciding the request state.
        for result in &results {
            let status = match &result.outcome {
                SlideOutcome::Succeeded { .. } => SlideStatus::SlideSucceeded {
                    attempts: result.attempts.len() as u32,
                },
                SlideOutcome::PermanentlyFailed { reason } => SlideStatus::SlideFailed {
                    attempts: result.attempts.len() as u32,
                    reason: reason.to_string(),
                },
                SlideOutcome::Cancelled => SlideStatus::SlideCancelled,
            };
            self.store.set_slide(request_id, result.index, status).await;
        }

        if *cancel_rx.borrow()
            || results
                .iter()
                .any(|r| matches!(r.outcome, SlideOutcome::Cancelled))
        {
            info!(%request_id, "request cancelled during slide processing");
            self.store.set_state(request_id, JobState::Cancelled).await;
            return;
        }

        let failed: Vec<SlideFailure> = results
            .iter()
            .filter_map(|r| match &r.outcome {
                SlideOutcome::PermanentlyFailed { reason } => Some(SlideFailure {
                    index: r.index,
                    reason: reason.to_string(),
                }),
                _ => None,
            })
            .collect();

        if !failed.is_empty() {
            // The assembler is never invoked on an incomplete set.
            let first_reason = results
                .iter()
                .find_map(|r| match &r.outcome {
                    SlideOutcome::PermanentlyFailed { reason } => Some(reason.clone()),
                    _ => None,
                })
                .expect("failed set is non-empty");
            warn!(
                %request_id,
                failed = failed.len(),
                total = results.len(),
                "request failed: slides exhausted their attempts"
            );
            self.store
                .set_state(
                    request_id,
                    JobState::Failed {
                        error: first_reason,
                        failed_slides: failed,
                    },
                )
                .await;
            return;
        }

        // ── Assembly ─────────────────────────────────────────────────────────
        if *cancel_rx.borrow() {
            self.store.set_state(request_id, JobState::Cancelled).await;
            return;
        }
        self.store
            .set_state(request_id, JobState::Assembling)
            .await;

        let clips: Vec<(usize, std::path::PathBuf)> = results
            .iter()
            .filter_map(|r| match &r.outcome {
                SlideOutcome::Succeeded { clip } => Some((r.index, clip.clone())),
                _ => None,
            })
            .collect();

        let artifact_path = workspace.join("final_lesson.mp4");
        match self.assembler.assemble(&clips, &artifact_path).await {
            Ok(artifact) => {
                info!(%request_id, artifact = %artifact.display(), "request completed");
                self.store
                    .set_state(request_id, JobState::Completed { artifact })
                    .await;
            }
            Err(error) => {
                error!(%request_id, %error, "assembly failed");
                self.store
                    .set_state(
                        request_id,
                        JobState::Failed {
                            error,
                            failed_slides: Vec::new(),
                        },
                    )
                    .await;
            }
        }
    }

    /// Call the storyboard collaborator and validate the result.
    async fn obtain_storyboard(&self, input_text: &str) -> Result<Storyboard, PipelineError> {
        let call = self
            .storyboarder
            .storyboard(input_text, self.config.requested_slides);
        let drafts = tokio::time::timeout(self.config.generation_timeout, call)
            .await
            .map_err(|_| PipelineError::Storyboard {
                message: format!(
                    "storyboard generation timed out after {}s",
                    self.config.generation_timeout.as_secs()
                ),
            })?
            .map_err(|e| PipelineError::Storyboard {
                message: e.to_string(),
            })?;

        Storyboard::from_drafts(drafts, self.config.max_slides)
    }

    /// Run every slide's retry controller under bounded concurrency and
    /// join all results.  There is no early exit on first failure, so the
    /// caller learns the full failure set.
    async fn process_slides(
        self: &Arc<Self>,
        request_id: RequestId,
        storyboard: &Storyboard,
        workspace: &Path,
        cancel_rx: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<SlideResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.slide_concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for spec in storyboard.slides() {
            let spec = spec.clone();
            let this = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let cancel_rx = cancel_rx.clone();
            let slide_dir = workspace.join(format!("slide_{:02}", spec.index));
            let store = self.store.clone();

            join_set.spawn(async move {
                // Closed semaphore cannot happen; treat it as cancellation.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        return SlideResult {
                            index: spec.index,
                            outcome: SlideOutcome::Cancelled,
                            attempts: Vec::new(),
                        }
                    }
                };

                let controller = SlideRetryController::new(
                    &this.compiler,
                    &this.runner,
                    this.config.attempt_cap,
                );
                controller
                    .run(&spec, &slide_dir, cancel_rx, &store, request_id)
                    .await
            });
        }

        let mut slots: Vec<Option<SlideResult>> = vec![None; storyboard.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    let index = result.index;
                    slots[index] = Some(result);
                }
                Err(e) => {
                    // A panicked slide task is recorded below as a failure
                    // in whichever slot stayed empty.
                    error!(%request_id, error = %e, "slide task aborted");
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| SlideResult {
                    index,
                    outcome: SlideOutcome::PermanentlyFailed {
                        reason: PipelineError::Execution {
                            slide: index,
                            message: "slide task aborted unexpectedly".to_owned(),
                        },
                    },
                    attempts: Vec::new(),
                })
            })
            .collect()
    }
}
