//! Worktree listing

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::commands::git_command_checked;
use crate::error::Result;

/// Status of a worktree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStatus {
    /// Worktree is active and usable
    Active,
    /// Worktree is locked
    Locked,
    /// Worktree is prunable (orphaned)
    Prunable,
}

/// Represents a Git worktree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worktree {
    /// Absolute path to the worktree
    pub path: PathBuf,
    /// Branch checked out in this worktree (empty when detached)
    pub branch: String,
    /// Commit hash at the HEAD of this worktree
    pub head: String,
    /// Status of the worktree
    pub status: WorktreeStatus,
    /// Whether this is the main worktree
    pub is_main: bool,
}

/// Parse `git worktree list --porcelain` output
pub fn parse_worktree_list(output: &str) -> Vec<Worktree> {
    let mut worktrees = Vec::new();
    let mut current_worktree: Option<Worktree> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            // Save previous worktree if exists
            if let Some(wt) = current_worktree.take() {
                worktrees.push(wt);
            }

            current_worktree = Some(Worktree {
                path: PathBuf::from(path),
                branch: String::new(),
                head: String::new(),
                status: WorktreeStatus::Active,
                is_main: false,
            });
        } else if let Some(ref mut wt) = current_worktree {
            if let Some(head) = line.strip_prefix("HEAD ") {
                wt.head = head.to_string();
            } else if let Some(branch) = line.strip_prefix("branch ") {
                wt.branch = branch.trim_start_matches("refs/heads/").to_string();
            } else if line == "bare" {
                wt.is_main = true;
            } else if line == "locked" || line.starts_with("locked ") {
                wt.status = WorktreeStatus::Locked;
            } else if line == "prunable" || line.starts_with("prunable ") {
                wt.status = WorktreeStatus::Prunable;
            }
        }
    }

    // Don't forget the last worktree
    if let Some(wt) = current_worktree {
        worktrees.push(wt);
    }

    // The first entry is always the primary working directory
    if let Some(first) = worktrees.first_mut() {
        first.is_main = true;
    }

    worktrees
}

/// List all worktrees registered with the repository at `repo_path`
pub async fn list_worktrees(repo_path: &Path) -> Result<Vec<Worktree>> {
    let output = git_command_checked(repo_path, &["worktree", "list", "--porcelain"]).await?;
    Ok(parse_worktree_list(&output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_worktree_list() {
        let output = "worktree /repo\nHEAD abc123\nbranch refs/heads/main\n\n\
                      worktree /repo/.worktrees/feature\nHEAD def456\nbranch refs/heads/autorun/feature\nlocked\n\n\
                      worktree /tmp/gone\nHEAD 000000\ndetached\nprunable gitdir file points to non-existent location\n";
        let worktrees = parse_worktree_list(output);

        assert_eq!(worktrees.len(), 3);
        assert!(worktrees[0].is_main);
        assert_eq!(worktrees[0].branch, "main");
        assert_eq!(worktrees[1].path, PathBuf::from("/repo/.worktrees/feature"));
        assert_eq!(worktrees[1].branch, "autorun/feature");
        assert_eq!(worktrees[1].status, WorktreeStatus::Locked);
        assert!(!worktrees[1].is_main);
        assert_eq!(worktrees[2].branch, "");
        assert_eq!(worktrees[2].status, WorktreeStatus::Prunable);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_worktree_list("").is_empty());
    }
}
