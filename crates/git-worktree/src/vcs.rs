//! Version-control capability consumed by batch runs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Outcome of preparing a worktree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeSetup {
    /// A new worktree was created by this call
    pub created: bool,
    /// Branch currently checked out in the worktree
    pub current_branch: String,
    /// The worktree exists but is on a different branch than requested
    pub branch_mismatch: bool,
}

/// Minimal repository status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStatus {
    pub branch: String,
    pub has_uncommitted_changes: bool,
}

/// A created pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub url: String,
}

/// Version-control operations a batch run needs
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Make sure a worktree of `repo_path` exists at `worktree_path`.
    ///
    /// A fresh worktree is created on `branch`; an existing one is left as is
    /// and reported with `branch_mismatch` when it is on another branch.
    async fn setup_worktree(
        &self,
        repo_path: &Path,
        worktree_path: &Path,
        branch: &str,
    ) -> Result<WorktreeSetup>;

    /// Switch `worktree_path` to `branch`.
    ///
    /// Fails with `UncommittedChanges` rather than discarding local edits.
    async fn checkout_branch(
        &self,
        worktree_path: &Path,
        branch: &str,
        create_if_missing: bool,
    ) -> Result<()>;

    /// Default branch of the repository (remote HEAD, `main` or `master`)
    async fn get_default_branch(&self, repo_path: &Path) -> Result<String>;

    /// Push the current branch and open a pull request against `base_branch`
    async fn create_pull_request(
        &self,
        cwd: &Path,
        base_branch: &str,
        title: &str,
        body: &str,
        gh_path: Option<&str>,
    ) -> Result<PullRequest>;

    async fn get_status(&self, cwd: &Path) -> Result<RepoStatus>;
}
