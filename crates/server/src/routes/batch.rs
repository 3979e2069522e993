//! Batch run API endpoints
//!
//! Starting, observing and steering a session's batch run.

use std::convert::Infallible;
use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use autorun_core::batch::{AgentError, AgentErrorKind, BatchRunConfig, BatchRunState, ProgressSnapshot};
use batch_runner::{ProgressUpdate, RunEvent, SessionDirectory};

use super::{api_error, batch_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBatchRequest {
    /// Folder holding the task documents
    pub folder_path: PathBuf,
    #[serde(flatten)]
    pub config: BatchRunConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBatchResponse {
    pub session_id: String,
    pub started: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStateResponse {
    pub session_id: String,
    pub state: BatchRunState,
    pub progress: Option<ProgressSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub session_id: String,
    pub action: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseRequest {
    pub message: String,
    /// Classified from the message when absent
    pub error_type: Option<AgentErrorKind>,
    /// Defaults to the document currently being worked
    pub document_index: Option<usize>,
    pub task_description: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostActiveRequest {
    pub active: bool,
}

// ============================================================================
// Handlers
// ============================================================================

async fn ensure_session(state: &AppState, session_id: &str) -> Result<(), ApiError> {
    match state.sessions().get(session_id).await {
        Some(_) => Ok(()),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        )),
    }
}

/// POST /api/sessions/{id}/batch - Start a batch run in the background
async fn start_batch(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<StartBatchRequest>,
) -> Result<(StatusCode, Json<StartBatchResponse>), ApiError> {
    ensure_session(&state, &session_id).await?;
    tracing::info!(
        "Batch request for session {}: {} document(s) in {:?}, loop={}",
        session_id,
        req.config.documents.len(),
        req.folder_path,
        req.config.loop_enabled
    );

    let spawned = state
        .orchestrator()
        .spawn_run(&session_id, req.config, req.folder_path)
        .await
        .map_err(batch_error)?;

    match spawned {
        Some(handle) => {
            let id = session_id.clone();
            tokio::spawn(async move {
                match handle.await {
                    Ok(info) => tracing::debug!(
                        "Batch run for session {} finished: {}/{} task(s)",
                        id,
                        info.completed_tasks,
                        info.total_tasks
                    ),
                    Err(e) => tracing::error!("Batch run task for session {} panicked: {}", id, e),
                }
            });
            Ok((
                StatusCode::ACCEPTED,
                Json(StartBatchResponse {
                    session_id,
                    started: true,
                    message: "Batch run started".to_string(),
                }),
            ))
        }
        None => Ok((
            StatusCode::OK,
            Json(StartBatchResponse {
                session_id,
                started: false,
                message: "Nothing to run".to_string(),
            }),
        )),
    }
}

/// GET /api/sessions/{id}/batch - Current run state
async fn get_batch(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<BatchStateResponse>, ApiError> {
    ensure_session(&state, &session_id).await?;
    let run_state = state.orchestrator().get_state(&session_id).await;
    Ok(Json(BatchStateResponse {
        progress: run_state.snapshot(),
        state: run_state,
        session_id,
    }))
}

fn control_response(session_id: String, action: &str) -> Json<ControlResponse> {
    Json(ControlResponse {
        session_id,
        action: action.to_string(),
    })
}

/// POST /api/sessions/{id}/batch/stop
async fn stop_batch(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    state
        .orchestrator()
        .stop_run(&session_id)
        .await
        .map_err(batch_error)?;
    Ok(control_response(session_id, "stop"))
}

/// POST /api/sessions/{id}/batch/resume
async fn resume_batch(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    state
        .orchestrator()
        .resume_after_error(&session_id)
        .await
        .map_err(batch_error)?;
    Ok(control_response(session_id, "resume"))
}

/// POST /api/sessions/{id}/batch/skip
async fn skip_document(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    state
        .orchestrator()
        .skip_current_document(&session_id)
        .await
        .map_err(batch_error)?;
    Ok(control_response(session_id, "skip"))
}

/// POST /api/sessions/{id}/batch/abort
async fn abort_batch(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ControlResponse>, ApiError> {
    state
        .orchestrator()
        .abort_on_error(&session_id)
        .await
        .map_err(batch_error)?;
    Ok(control_response(session_id, "abort"))
}

/// POST /api/sessions/{id}/batch/pause - Report an agent error
async fn pause_batch(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<PauseRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    let error = match req.error_type {
        Some(kind) => AgentError::new(kind, req.message),
        None => AgentError::from_output(req.message),
    };
    let document_index = match req.document_index {
        Some(index) => index,
        None => {
            state
                .orchestrator()
                .get_state(&session_id)
                .await
                .current_document_index
        }
    };
    state
        .orchestrator()
        .pause_on_error(&session_id, error, document_index, req.task_description)
        .await
        .map_err(batch_error)?;
    Ok(control_response(session_id, "pause"))
}

/// GET /api/sessions/{id}/batch/events - Progress and run events as SSE
async fn batch_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    ensure_session(&state, &session_id).await?;
    let orchestrator = state.orchestrator();

    let initial = ProgressUpdate {
        session_id: session_id.clone(),
        snapshot: orchestrator.get_state(&session_id).await.snapshot(),
    };
    let initial = Event::default()
        .event("progress")
        .json_data(&initial)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let progress_id = session_id.clone();
    let progress = BroadcastStream::new(orchestrator.subscribe_progress()).filter_map(
        move |item: Result<ProgressUpdate, _>| match item {
            Ok(update) if update.session_id == progress_id => {
                Event::default().event("progress").json_data(&update).ok()
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("SSE client lagged: {}", e);
                None
            }
        },
    );

    let events_id = session_id;
    let run_events = BroadcastStream::new(orchestrator.subscribe_events()).filter_map(
        move |item: Result<RunEvent, _>| match item {
            Ok(event) if event.session_id() == events_id => {
                Event::default().event("run").json_data(&event).ok()
            }
            _ => None,
        },
    );

    let stream = tokio_stream::once(initial)
        .chain(progress.merge(run_events))
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// POST /api/host/active - Host visibility for elapsed-time accounting
async fn set_host_active(
    State(state): State<AppState>,
    Json(req): Json<HostActiveRequest>,
) -> Json<HostActiveRequest> {
    state.orchestrator().set_host_active(req.active).await;
    Json(req)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions/{id}/batch", post(start_batch).get(get_batch))
        .route("/api/sessions/{id}/batch/stop", post(stop_batch))
        .route("/api/sessions/{id}/batch/resume", post(resume_batch))
        .route("/api/sessions/{id}/batch/skip", post(skip_document))
        .route("/api/sessions/{id}/batch/abort", post(abort_batch))
        .route("/api/sessions/{id}/batch/pause", post(pause_batch))
        .route("/api/sessions/{id}/batch/events", get(batch_events))
        .route("/api/host/active", post(set_host_active))
}
