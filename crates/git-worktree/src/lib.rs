//! Git Worktree management library
//!
//! This crate provides the version-control capability a batch run relies
//! on: preparing an isolated worktree on a given branch, inspecting
//! repository status and opening pull requests through `gh`.

mod commands;
mod error;
mod git_cli;
mod vcs;
mod worktree;

pub use error::{Result, WorktreeError};
pub use git_cli::GitCli;
pub use vcs::{PullRequest, RepoStatus, VersionControl, WorktreeSetup};
pub use worktree::{list_worktrees, parse_worktree_list, Worktree, WorktreeStatus};
