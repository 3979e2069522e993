//! Session API endpoints

use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use autorun_core::batch::RunHistoryEntry;
use batch_runner::SessionInfo;

use super::{api_error, batch_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Generated when absent
    pub id: Option<String>,
    pub name: String,
    pub cwd: PathBuf,
    pub group_name: Option<String>,
    pub tool_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub session_id: String,
    pub entries: Vec<RunHistoryEntry>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/sessions - Register a session
async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionInfo>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Session name must not be empty"));
    }

    let session = SessionInfo {
        id: req.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: req.name,
        cwd: req.cwd,
        group_name: req.group_name,
        tool_type: req
            .tool_type
            .unwrap_or_else(|| state.config().agent_type.as_str().to_string()),
    };
    tracing::info!("Registering session {} ({})", session.id, session.name);
    state.sessions().register(session.clone()).await;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions - List sessions
async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.sessions().list().await,
    })
}

/// DELETE /api/sessions/{id} - Remove a session and its progress slot
async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions().remove(&session_id).await.is_none() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        ));
    }
    state.orchestrator().remove_session(&session_id).await;
    tracing::info!("Removed session {}", session_id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/sessions/{id}/history - Run history, newest first
async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let entries = state
        .history()
        .list(&session_id)
        .await
        .map_err(batch_error)?;
    Ok(Json(HistoryResponse {
        session_id,
        entries,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/{id}", delete(delete_session))
        .route("/api/sessions/{id}/history", get(get_history))
}
