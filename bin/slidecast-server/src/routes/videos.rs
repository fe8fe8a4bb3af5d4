//! Video generation endpoints: submit, status, download, cancel.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use slidecast_core::{ArtifactError, RequestId};

use crate::error::ServerError;
use crate::schemas::{StatusResponse, SubmitRequest, SubmitResponse};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/videos", post(submit_video))
        .route("/videos/{id}", get(get_video_status))
        .route("/videos/{id}/download", get(download_video))
        .route("/videos/{id}/cancel", post(cancel_video))
}

fn parse_request_id(id: &str) -> Result<RequestId, ServerError> {
    Uuid::parse_str(id).map_err(|_| ServerError::BadRequest(format!("invalid request id: {id}")))
}

/// Accept a block of text and start generating a video for it.
pub async fn submit_video(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ServerError> {
    request
        .validate()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let request_id = state
        .service
        .submit(request.text)
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    info!(%request_id, "video generation started");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            request_id: request_id.to_string(),
            state: "received",
        }),
    ))
}

/// Current state and per-slide progress of a request.
pub async fn get_video_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ServerError> {
    let request_id = parse_request_id(&id)?;
    let view = state
        .service
        .status(request_id)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("request {id} not found")))?;
    Ok(Json(StatusResponse::from_view(view)))
}

/// Download the final artifact; only valid once the request completed.
pub async fn download_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let request_id = parse_request_id(&id)?;

    let artifact = state.service.artifact(request_id).await.map_err(|e| match e {
        ArtifactError::NotFound => ServerError::NotFound(format!("request {id} not found")),
        ArtifactError::NotReady { state } => {
            ServerError::Conflict(format!("video is not ready (request is {state})"))
        }
    })?;

    let bytes = tokio::fs::read(&artifact).await.map_err(|e| {
        ServerError::Internal(format!("artifact unreadable at {}: {e}", artifact.display()))
    })?;

    let headers = [
        (header::CONTENT_TYPE, "video/mp4".to_owned()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"video_{id}.mp4\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}

/// Best-effort cancellation of an in-flight request.
pub async fn cancel_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    let request_id = parse_request_id(&id)?;

    // Distinguish "unknown" from "already terminal" for the caller.
    if state.service.status(request_id).await.is_none() {
        return Err(ServerError::NotFound(format!("request {id} not found")));
    }
    if !state.service.cancel(request_id).await {
        return Err(ServerError::Conflict(format!(
            "request {id} is not cancellable"
        )));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "cancelling" })),
    ))
}
