use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::orchestrator::{Collaborators, PipelineOrchestrator};
use crate::store::{JobStatusView, JobStore, RequestId};

/// Errors from [`VideoService::artifact`].
#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    #[error("request not found")]
    NotFound,
    /// The request exists but has not completed; carries the current state
    /// name so callers can report it.
    #[error("artifact not ready (request is {state})")]
    NotReady { state: &'static str },
}

/// Entry point for the surrounding system (HTTP layer, CLI, tests).
///
/// Owns the job store and the orchestrator; `submit` starts processing in
/// the background and returns immediately.
#[derive(Clone)]
pub struct VideoService {
    orchestrator: Arc<PipelineOrchestrator>,
    store: JobStore,
}

impl VideoService {
    pub fn new(config: PipelineConfig, collab: Collaborators) -> Self {
        let store = JobStore::new();
        let orchestrator = Arc::new(PipelineOrchestrator::new(config, collab, store.clone()));
        Self {
            orchestrator,
            store,
        }
    }

    /// Create a job record and begin processing asynchronously.
    pub async fn submit(&self, text: String) -> Result<RequestId, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::Storyboard {
                message: "input text is empty".to_owned(),
            });
        }

        let request_id = self.store.create(text.clone()).await;
        info!(%request_id, chars = text.len(), "request submitted");

        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            orchestrator.run(request_id, text).await;
        });

        Ok(request_id)
    }

    /// Snapshot of the request's state and per-slide progress.
    pub async fn status(&self, request_id: RequestId) -> Option<JobStatusView> {
        self.store.status(request_id).await
    }

    /// Final artifact path; only available once the request completed.
    pub async fn artifact(&self, request_id: RequestId) -> Result<PathBuf, ArtifactError> {
        match self.store.artifact(request_id).await {
            Some(path) => Ok(path),
            None => match self.store.status(request_id).await {
                Some(view) => Err(ArtifactError::NotReady {
                    state: view.state.name(),
                }),
                None => Err(ArtifactError::NotFound),
            },
        }
    }

    /// Best-effort cancellation.  Returns `false` if the request is unknown
    /// or already terminal.
    pub async fn cancel(&self, request_id: RequestId) -> bool {
        let accepted = self.store.request_cancel(request_id).await;
        if accepted {
            info!(%request_id, "cancellation requested");
        }
        accepted
    }
}
