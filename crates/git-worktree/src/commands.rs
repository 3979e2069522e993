//! Command execution utilities

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{Result, WorktreeError};

/// Output from an external command
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    /// Best error text: stderr, falling back to stdout
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Run `program` with `args` in `cwd` and capture its output
pub async fn run_command(program: &str, cwd: &Path, args: &[&str]) -> Result<CommandOutput> {
    debug!("Running {} {:?} in {:?}", program, args, cwd);

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            WorktreeError::git_failed_with_source(format!("Failed to execute {}", program), e)
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    trace!("{} stdout: {}", program, stdout);
    if !stderr.is_empty() {
        trace!("{} stderr: {}", program, stderr);
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        success: output.status.success(),
    })
}

/// Execute a git command in the specified directory
pub async fn git_command(repo_path: &Path, args: &[&str]) -> Result<CommandOutput> {
    run_command("git", repo_path, args).await
}

/// Execute a git command and return error if it fails
pub async fn git_command_checked(repo_path: &Path, args: &[&str]) -> Result<String> {
    let output = git_command(repo_path, args).await?;

    if !output.success {
        return Err(WorktreeError::git_failed(format!(
            "git {} failed: {}",
            args.join(" "),
            output.error_text()
        )));
    }

    Ok(output.stdout)
}

/// Check if a path is inside a git repository
pub async fn is_git_repository(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let output = git_command(path, &["rev-parse", "--git-dir"]).await?;
    Ok(output.success)
}

/// Get the root directory of the git repository
pub async fn get_repo_root(path: &Path) -> Result<PathBuf> {
    let output = git_command_checked(path, &["rev-parse", "--show-toplevel"]).await?;
    Ok(PathBuf::from(output.trim()))
}

/// Check if a branch exists
pub async fn branch_exists(repo_path: &Path, branch: &str) -> Result<bool> {
    let output = git_command(
        repo_path,
        &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", branch)],
    )
    .await?;
    Ok(output.success)
}

/// Name of the branch checked out at `path` (`HEAD` when detached)
pub async fn current_branch(path: &Path) -> Result<String> {
    let output = git_command_checked(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    Ok(output.trim().to_string())
}

/// Check if there are uncommitted changes at `path`
pub async fn has_uncommitted_changes(path: &Path) -> Result<bool> {
    let output = git_command_checked(path, &["status", "--porcelain"]).await?;
    Ok(!output.trim().is_empty())
}

/// Branch that `origin/HEAD` points at, if the remote advertises one
pub async fn remote_default_branch(repo_path: &Path) -> Result<Option<String>> {
    let output = git_command(
        repo_path,
        &["symbolic-ref", "--quiet", "refs/remotes/origin/HEAD"],
    )
    .await?;
    if !output.success {
        return Ok(None);
    }
    Ok(output
        .stdout
        .trim()
        .strip_prefix("refs/remotes/origin/")
        .map(str::to_string)
        .filter(|b| !b.is_empty()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) async fn init_test_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git_command_checked(dir.path(), &["init"]).await.unwrap();
        git_command_checked(dir.path(), &["config", "user.email", "test@test.com"])
            .await
            .unwrap();
        git_command_checked(dir.path(), &["config", "user.name", "Test"])
            .await
            .unwrap();

        // Create initial commit on main branch
        git_command_checked(dir.path(), &["checkout", "-b", "main"])
            .await
            .ok(); // Ignore error if already on main

        let test_file = dir.path().join("test.txt");
        tokio::fs::write(&test_file, "test content").await.unwrap();
        git_command_checked(dir.path(), &["add", "."]).await.unwrap();
        git_command_checked(dir.path(), &["commit", "-m", "Initial commit"])
            .await
            .unwrap();

        dir
    }

    #[tokio::test]
    async fn test_is_git_repository() {
        let dir = init_test_repo().await;
        assert!(is_git_repository(dir.path()).await.unwrap());

        let non_git = TempDir::new().unwrap();
        assert!(!is_git_repository(non_git.path()).await.unwrap());
        assert!(!is_git_repository(&non_git.path().join("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_branch_exists_and_current_branch() {
        let dir = init_test_repo().await;

        assert!(branch_exists(dir.path(), "main").await.unwrap());
        assert!(!branch_exists(dir.path(), "nonexistent").await.unwrap());
        assert_eq!(current_branch(dir.path()).await.unwrap(), "main");
    }

    #[tokio::test]
    async fn test_has_uncommitted_changes() {
        let dir = init_test_repo().await;
        assert!(!has_uncommitted_changes(dir.path()).await.unwrap());

        tokio::fs::write(dir.path().join("new_file.txt"), "new content")
            .await
            .unwrap();
        assert!(has_uncommitted_changes(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_remote_default_branch_without_remote() {
        let dir = init_test_repo().await;
        assert_eq!(remote_default_branch(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_checked_command_reports_stderr() {
        let dir = init_test_repo().await;
        let err = git_command_checked(dir.path(), &["checkout", "no-such-branch"])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("git checkout no-such-branch failed"));
    }
}
