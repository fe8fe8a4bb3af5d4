//! Request / response types for the video endpoints.

use serde::{Deserialize, Serialize};
use slidecast_core::{JobState, JobStatusView, SlideStatus};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    /// Source text for the lesson video.
    #[validate(length(min = 1, max = 20000, message = "text must be 1–20000 characters"))]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub request_id: String,
    pub state: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SlideProgress {
    pub index: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub request_id: String,
    pub state: &'static str,
    pub created_at: String,
    pub slides: Vec<SlideProgress>,
    /// Present only when the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Indices of permanently-failed slides, present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_slides: Option<Vec<usize>>,
}

impl StatusResponse {
    pub fn from_view(view: JobStatusView) -> Self {
        let (error, failed_slides) = match &view.state {
            JobState::Failed {
                error,
                failed_slides,
            } => (
                Some(error.to_string()),
                Some(failed_slides.iter().map(|f| f.index).collect()),
            ),
            _ => (None, None),
        };

        Self {
            request_id: view.request_id.to_string(),
            state: view.state.name(),
            created_at: view.created_at.to_rfc3339(),
            slides: view
                .slides
                .iter()
                .enumerate()
                .map(|(index, status)| slide_progress(index, status))
                .collect(),
            error,
            failed_slides,
        }
    }
}

fn slide_progress(index: usize, status: &SlideStatus) -> SlideProgress {
    match status {
        SlideStatus::SlidePending => SlideProgress {
            index,
            status: "pending",
            attempts: None,
            reason: None,
        },
        SlideStatus::SlideAttempting { attempt } => SlideProgress {
            index,
            status: "attempting",
            attempts: Some(*attempt),
            reason: None,
        },
        SlideStatus::SlideSucceeded { attempts } => SlideProgress {
            index,
            status: "succeeded",
            attempts: Some(*attempts),
            reason: None,
        },
        SlideStatus::SlideFailed { attempts, reason } => SlideProgress {
            index,
            status: "failed",
            attempts: Some(*attempts),
            reason: Some(reason.clone()),
        },
        SlideStatus::SlideCancelled => SlideProgress {
            index,
            status: "cancelled",
            attempts: None,
            reason: None,
        },
    }
}
