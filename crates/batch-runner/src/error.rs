//! Error types for batch-runner

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for batch operations
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors that can occur while preparing or driving a batch run
#[derive(Debug, Error)]
pub enum BatchError {
    /// Core library error
    #[error(transparent)]
    Core(#[from] autorun_core::Error),

    /// Version-control operation failed
    #[error("Worktree error: {0}")]
    Worktree(#[from] git_worktree::WorktreeError),

    /// The isolated workspace could not be prepared
    #[error("Workspace setup failed: {message}")]
    WorkspaceSetup {
        message: String,
        #[source]
        source: Option<git_worktree::WorktreeError>,
    },

    /// Session already has a run in progress
    #[error("Session {session_id} already has a batch run in progress")]
    AlreadyRunning { session_id: String },

    /// Session has no run in progress
    #[error("Session {session_id} has no batch run in progress")]
    NotRunning { session_id: String },

    /// Session not found
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Failed to spawn agent process
    #[error("Failed to spawn agent process: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Agent invocation failed
    #[error("Agent error: {message}")]
    Agent { message: String },

    /// Invalid agent type
    #[error("Invalid agent type: {agent_type}")]
    InvalidAgentType { agent_type: String },

    /// Document could not be read or written
    #[error("Document {path} unavailable: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No backup exists for a document being restored
    #[error("No backup found for {path}")]
    BackupMissing { path: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BatchError {
    /// Create an Agent error
    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent {
            message: message.into(),
        }
    }

    /// Create a SpawnFailed error with source
    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a WorkspaceSetup error from a version-control failure
    pub fn workspace(message: impl Into<String>, source: git_worktree::WorktreeError) -> Self {
        Self::WorkspaceSetup {
            message: message.into(),
            source: Some(source),
        }
    }
}
