//! Route handlers

pub mod batch;
pub mod health;
pub mod sessions;

use axum::{http::StatusCode, Json};
use serde::Serialize;

use batch_runner::BatchError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a batch error onto an HTTP status
pub fn batch_error(err: BatchError) -> ApiError {
    let status = match &err {
        BatchError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
        BatchError::AlreadyRunning { .. } | BatchError::NotRunning { .. } => StatusCode::CONFLICT,
        BatchError::Core(autorun_core::Error::InvalidInput(_))
        | BatchError::InvalidAgentType { .. } => StatusCode::BAD_REQUEST,
        BatchError::WorkspaceSetup { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    api_error(status, err.to_string())
}
