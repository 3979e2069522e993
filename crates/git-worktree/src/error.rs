//! Error types for git-worktree operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for worktree operations
pub type Result<T> = std::result::Result<T, WorktreeError>;

/// Errors that can occur during version-control operations
#[derive(Debug, Error)]
pub enum WorktreeError {
    /// Git command execution failed
    #[error("Git command failed: {message}")]
    GitCommandFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A non-git tool (e.g. `gh`) failed
    #[error("{program} failed: {message}")]
    CommandFailed { program: String, message: String },

    /// Branch not found
    #[error("Branch '{branch}' not found")]
    BranchNotFound { branch: String },

    /// Not a git repository
    #[error("Not a git repository: {path}")]
    NotAGitRepository { path: PathBuf },

    /// Path exists but is not a worktree of the repository
    #[error("Invalid worktree path: {path}")]
    InvalidPath { path: PathBuf },

    /// Refusing to switch branches over local changes
    #[error("Worktree at {path} has uncommitted changes")]
    UncommittedChanges { path: PathBuf },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse git output
    #[error("Failed to parse git output: {message}")]
    ParseError { message: String },
}

impl WorktreeError {
    /// Create a GitCommandFailed error
    pub fn git_failed(message: impl Into<String>) -> Self {
        Self::GitCommandFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a GitCommandFailed error with source
    pub fn git_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::GitCommandFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether a checkout was refused because of local changes
    pub fn is_uncommitted_changes(&self) -> bool {
        matches!(self, Self::UncommittedChanges { .. })
    }
}
