use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::error::PipelineError;

/// Unique identifier for a submitted video request.
pub type RequestId = Uuid;

/// One permanently-failed slide with its reason, surfaced in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideFailure {
    pub index: usize,
    pub reason: String,
}

/// Lifecycle state of a video request.
///
/// Transitions are monotonic: once a terminal state (`Completed`, `Failed`,
/// `Cancelled`) is reached the record never changes again.
#[derive(Debug, Clone)]
pub enum JobState {
    /// Accepted, orchestrator not yet running.
    Received,
    /// Waiting on the storyboard collaborator.
    Storyboarding,
    /// Slides are being generated and rendered.
    SlideProcessing,
    /// All slides succeeded; final concatenation in progress.
    Assembling,
    /// Final artifact is ready.
    Completed { artifact: PathBuf },
    /// The request failed; `failed_slides` is non-empty when the failure
    /// came from slide processing.
    Failed {
        error: PipelineError,
        failed_slides: Vec<SlideFailure>,
    },
    /// The caller cancelled the request before completion.
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. } | JobState::Failed { .. } | JobState::Cancelled
        )
    }

    /// Stable lowercase name used in status responses.
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Storyboarding => "storyboarding",
            JobState::SlideProcessing => "slide_processing",
            JobState::Assembling => "assembling",
            JobState::Completed { .. } => "completed",
            JobState::Failed { .. } => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

/// Fine-grained progress of a single slide within a request.
#[derive(Debug, Clone)]
pub enum SlideStatus {
    SlidePending,
    SlideAttempting { attempt: u32 },
    SlideSucceeded { attempts: u32 },
    SlideFailed { attempts: u32, reason: String },
    SlideCancelled,
}

/// The complete in-memory record for one request.
#[derive(Debug)]
pub struct JobRecord {
    pub request_id: RequestId,
    pub input_text: String,
    pub created_at: DateTime<Utc>,
    pub state: JobState,
    /// Sized once the storyboard is known; empty before that.
    pub slides: Vec<SlideStatus>,
    /// Cancellation signal observed by the orchestrator at stage and
    /// attempt boundaries.
    pub cancel_tx: Arc<tokio::sync::watch::Sender<bool>>,
}

/// A read-only snapshot of a request returned to callers.
#[derive(Debug, Clone)]
pub struct JobStatusView {
    pub request_id: RequestId,
    pub created_at: DateTime<Utc>,
    pub state: JobState,
    pub slides: Vec<SlideStatus>,
}

/// Process-wide map from request id to job record.
///
/// Mutated only by the pipeline orchestrator; the HTTP layer reads
/// snapshots.  A `tokio::sync::RwLock` keeps each record's reads and writes
/// linearizable with respect to each other.
#[derive(Debug, Clone)]
pub struct JobStore {
    inner: Arc<RwLock<HashMap<RequestId, JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a new record in `Received` state and return its id.
    pub async fn create(&self, input_text: String) -> RequestId {
        let request_id = Uuid::new_v4();
        let (cancel_tx, _cancel_rx) = tokio::sync::watch::channel(false);

        let record = JobRecord {
            request_id,
            input_text,
            created_at: Utc::now(),
            state: JobState::Received,
            slides: Vec::new(),
            cancel_tx: Arc::new(cancel_tx),
        };

        self.inner.write().await.insert(request_id, record);
        request_id
    }

    /// Transition a request to `state`.
    ///
    /// Returns `false` (and leaves the record untouched) if the record does
    /// not exist or is already terminal; states never regress.
    pub async fn set_state(&self, request_id: RequestId, state: JobState) -> bool {
        let mut guard = self.inner.write().await;
        let Some(record) = guard.get_mut(&request_id) else {
            return false;
        };
        if record.state.is_terminal() {
            warn!(
                %request_id,
                current = record.state.name(),
                requested = state.name(),
                "ignoring state transition on terminal record"
            );
            return false;
        }
        record.state = state;
        true
    }

    /// Size the per-slide progress vector once the storyboard is known.
    pub async fn init_slides(&self, request_id: RequestId, count: usize) {
        if let Some(record) = self.inner.write().await.get_mut(&request_id) {
            record.slides = (0..count).map(|_| SlideStatus::SlidePending).collect();
        }
    }

    /// Update the progress of one slide.  No-op on terminal records so that
    /// late-arriving attempt updates cannot mutate a finished request.
    pub async fn set_slide(&self, request_id: RequestId, index: usize, status: SlideStatus) {
        if let Some(record) = self.inner.write().await.get_mut(&request_id) {
            if record.state.is_terminal() {
                return;
            }
            if let Some(slot) = record.slides.get_mut(index) {
                *slot = status;
            }
        }
    }

    pub async fn cancel_tx(
        &self,
        request_id: RequestId,
    ) -> Option<Arc<tokio::sync::watch::Sender<bool>>> {
        self.inner
            .read()
            .await
            .get(&request_id)
            .map(|r| Arc::clone(&r.cancel_tx))
    }

    /// Signal cancellation.  Returns `false` if the record is unknown or
    /// already terminal.
    pub async fn request_cancel(&self, request_id: RequestId) -> bool {
        let guard = self.inner.read().await;
        match guard.get(&request_id) {
            Some(record) if !record.state.is_terminal() => {
                let _ = record.cancel_tx.send(true);
                true
            }
            _ => false,
        }
    }

    pub async fn status(&self, request_id: RequestId) -> Option<JobStatusView> {
        let guard = self.inner.read().await;
        let record = guard.get(&request_id)?;
        Some(JobStatusView {
            request_id,
            created_at: record.created_at,
            state: record.state.clone(),
            slides: record.slides.clone(),
        })
    }

    /// Final artifact path, present only once the request is `Completed`.
    pub async fn artifact(&self, request_id: RequestId) -> Option<PathBuf> {
        let guard = self.inner.read().await;
        match guard.get(&request_id).map(|r| &r.state) {
            Some(JobState::Completed { artifact }) => Some(artifact.clone()),
            _ => None,
        }
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_starts_in_received() {
        let store = JobStore::new();
        let id = store.create("hello".to_owned()).await;
        let view = store.status(id).await.expect("record should exist");
        assert!(matches!(view.state, JobState::Received));
        assert!(view.slides.is_empty());
    }

    #[tokio::test]
    async fn states_never_regress_from_terminal() {
        let store = JobStore::new();
        let id = store.create("x".to_owned()).await;

        assert!(store.set_state(id, JobState::Storyboarding).await);
        assert!(store.set_state(id, JobState::Cancelled).await);

        // Any further transition must be refused.
        assert!(!store.set_state(id, JobState::SlideProcessing).await);
        assert!(
            !store
                .set_state(
                    id,
                    JobState::Completed {
                        artifact: PathBuf::from("nope.mp4")
                    }
                )
                .await
        );

        let view = store.status(id).await.expect("record should exist");
        assert!(matches!(view.state, JobState::Cancelled));
    }

    #[tokio::test]
    async fn slide_updates_ignored_after_terminal_state() {
        let store = JobStore::new();
        let id = store.create("x".to_owned()).await;
        store.init_slides(id, 2).await;
        store.set_state(id, JobState::Cancelled).await;

        store
            .set_slide(id, 0, SlideStatus::SlideSucceeded { attempts: 1 })
            .await;

        let view = store.status(id).await.expect("record should exist");
        assert!(matches!(view.slides[0], SlideStatus::SlidePending));
    }

    #[tokio::test]
    async fn artifact_only_visible_when_completed() {
        let store = JobStore::new();
        let id = store.create("x".to_owned()).await;
        assert!(store.artifact(id).await.is_none());

        store.set_state(id, JobState::Storyboarding).await;
        assert!(store.artifact(id).await.is_none());

        store
            .set_state(
                id,
                JobState::Completed {
                    artifact: PathBuf::from("final.mp4"),
                },
            )
            .await;
        assert_eq!(store.artifact(id).await, Some(PathBuf::from("final.mp4")));
    }

    #[tokio::test]
    async fn cancel_rejected_on_terminal_record() {
        let store = JobStore::new();
        let id = store.create("x".to_owned()).await;
        store
            .set_state(
                id,
                JobState::Failed {
                    error: PipelineError::Storyboard {
                        message: "empty".to_owned(),
                    },
                    failed_slides: Vec::new(),
                },
            )
            .await;
        assert!(!store.request_cancel(id).await);
    }

    #[tokio::test]
    async fn unknown_request_yields_none() {
        let store = JobStore::new();
        assert!(store.status(Uuid::new_v4()).await.is_none());
        assert!(!store.request_cancel(Uuid::new_v4()).await);
    }
}
