//! Isolated workspace preparation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use autorun_core::batch::WorktreeConfig;
use git_worktree::{VersionControl, WorktreeError};

use crate::error::{BatchError, Result};

/// Where a run executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Directory the agent is run in
    pub effective_cwd: PathBuf,
    /// Present when the run uses an isolated worktree
    pub worktree: Option<ActiveWorktree>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWorktree {
    pub path: PathBuf,
    pub branch: String,
}

/// Makes sure the target branch is checked out at the worktree path
#[derive(Clone)]
pub struct WorkspaceManager {
    vcs: Arc<dyn VersionControl>,
}

impl WorkspaceManager {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self { vcs }
    }

    /// Resolve the working directory for a run.
    ///
    /// A missing or disabled worktree config leaves the session directory in
    /// place. Any version-control failure fails the setup.
    pub async fn ensure(
        &self,
        config: Option<&WorktreeConfig>,
        source_repo: &Path,
        session_cwd: &Path,
    ) -> Result<Workspace> {
        let Some(config) = config.filter(|c| c.enabled) else {
            return Ok(Workspace {
                effective_cwd: session_cwd.to_path_buf(),
                worktree: None,
            });
        };

        let setup = self
            .vcs
            .setup_worktree(source_repo, &config.path, &config.branch_name)
            .await
            .map_err(|e| {
                BatchError::workspace(
                    format!("could not prepare worktree at {}", config.path.display()),
                    e,
                )
            })?;

        if setup.branch_mismatch {
            info!(
                "Worktree {} is on {}, switching to {}",
                config.path.display(),
                setup.current_branch,
                config.branch_name
            );
            self.vcs
                .checkout_branch(&config.path, &config.branch_name, true)
                .await
                .map_err(|e| {
                    let message = match &e {
                        WorktreeError::UncommittedChanges { .. } => format!(
                            "worktree at {} has uncommitted changes; commit or stash them before switching to {}",
                            config.path.display(),
                            config.branch_name
                        ),
                        _ => format!("could not switch worktree to {}", config.branch_name),
                    };
                    warn!("{}", message);
                    BatchError::workspace(message, e)
                })?;
        }

        info!(
            "Using worktree {} on branch {}",
            config.path.display(),
            config.branch_name
        );
        Ok(Workspace {
            effective_cwd: config.path.clone(),
            worktree: Some(ActiveWorktree {
                path: config.path.clone(),
                branch: config.branch_name.clone(),
            }),
        })
    }
}
