//! `git`/`gh` backed implementation of [`VersionControl`]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::commands::{
    branch_exists, current_branch, get_repo_root, git_command_checked, has_uncommitted_changes,
    is_git_repository, remote_default_branch, run_command,
};
use crate::error::{Result, WorktreeError};
use crate::vcs::{PullRequest, RepoStatus, VersionControl, WorktreeSetup};
use crate::worktree::list_worktrees;

/// Version control through the `git` and `gh` command line tools
#[derive(Debug, Clone)]
pub struct GitCli {
    /// Executable used for pull requests when no override is given
    gh_program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            gh_program: "gh".to_string(),
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `gh` executable by default
    pub fn with_gh_program(mut self, gh_program: impl Into<String>) -> Self {
        self.gh_program = gh_program.into();
        self
    }
}

/// Canonical form used to compare worktree paths
async fn canonical(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

#[async_trait]
impl VersionControl for GitCli {
    async fn setup_worktree(
        &self,
        repo_path: &Path,
        worktree_path: &Path,
        branch: &str,
    ) -> Result<WorktreeSetup> {
        if !is_git_repository(repo_path).await? {
            return Err(WorktreeError::NotAGitRepository {
                path: repo_path.to_path_buf(),
            });
        }
        let repo_root = get_repo_root(repo_path).await?;

        if worktree_path.exists() {
            let target = canonical(worktree_path).await;
            let mut registered = None;
            for wt in list_worktrees(&repo_root).await? {
                if canonical(&wt.path).await == target {
                    registered = Some(wt);
                    break;
                }
            }
            let worktree = registered.ok_or_else(|| WorktreeError::InvalidPath {
                path: worktree_path.to_path_buf(),
            })?;

            let current = if worktree.branch.is_empty() {
                current_branch(worktree_path).await?
            } else {
                worktree.branch
            };
            debug!(
                "Reusing worktree at {:?} (on {}, wanted {})",
                worktree_path, current, branch
            );
            return Ok(WorktreeSetup {
                created: false,
                branch_mismatch: current != branch,
                current_branch: current,
            });
        }

        if let Some(parent) = worktree_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let path_arg = worktree_path.to_string_lossy();
        if branch_exists(&repo_root, branch).await? {
            info!("Creating worktree at {:?} on existing branch {}", worktree_path, branch);
            git_command_checked(&repo_root, &["worktree", "add", &path_arg, branch]).await?;
        } else {
            info!("Creating worktree at {:?} on new branch {}", worktree_path, branch);
            git_command_checked(&repo_root, &["worktree", "add", "-b", branch, &path_arg]).await?;
        }

        Ok(WorktreeSetup {
            created: true,
            current_branch: branch.to_string(),
            branch_mismatch: false,
        })
    }

    async fn checkout_branch(
        &self,
        worktree_path: &Path,
        branch: &str,
        create_if_missing: bool,
    ) -> Result<()> {
        if has_uncommitted_changes(worktree_path).await? {
            return Err(WorktreeError::UncommittedChanges {
                path: worktree_path.to_path_buf(),
            });
        }

        if branch_exists(worktree_path, branch).await? {
            git_command_checked(worktree_path, &["checkout", branch]).await?;
        } else if create_if_missing {
            git_command_checked(worktree_path, &["checkout", "-b", branch]).await?;
        } else {
            return Err(WorktreeError::BranchNotFound {
                branch: branch.to_string(),
            });
        }

        info!("Checked out {} in {:?}", branch, worktree_path);
        Ok(())
    }

    async fn get_default_branch(&self, repo_path: &Path) -> Result<String> {
        if let Some(branch) = remote_default_branch(repo_path).await? {
            return Ok(branch);
        }
        for candidate in ["main", "master"] {
            if branch_exists(repo_path, candidate).await? {
                return Ok(candidate.to_string());
            }
        }
        Err(WorktreeError::BranchNotFound {
            branch: "default".to_string(),
        })
    }

    async fn create_pull_request(
        &self,
        cwd: &Path,
        base_branch: &str,
        title: &str,
        body: &str,
        gh_path: Option<&str>,
    ) -> Result<PullRequest> {
        git_command_checked(cwd, &["push", "-u", "origin", "HEAD"]).await?;

        let program = gh_path.unwrap_or(self.gh_program.as_str());
        let output = run_command(
            program,
            cwd,
            &[
                "pr", "create", "--base", base_branch, "--title", title, "--body", body,
            ],
        )
        .await?;

        if !output.success {
            return Err(WorktreeError::CommandFailed {
                program: program.to_string(),
                message: output.error_text(),
            });
        }

        let url = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| WorktreeError::ParseError {
                message: "gh pr create printed no URL".to_string(),
            })?;

        info!("Created pull request {}", url);
        Ok(PullRequest { url })
    }

    async fn get_status(&self, cwd: &Path) -> Result<RepoStatus> {
        Ok(RepoStatus {
            branch: current_branch(cwd).await?,
            has_uncommitted_changes: has_uncommitted_changes(cwd).await?,
        })
    }
}
