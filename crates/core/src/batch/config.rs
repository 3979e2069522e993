use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Error, Result};

/// One checklist document in a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDocumentEntry {
    /// Document name relative to the run folder
    pub filename: String,
    /// Restore the document to all-unchecked once drained
    #[serde(default)]
    pub reset_on_completion: bool,
}

impl BatchDocumentEntry {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            reset_on_completion: false,
        }
    }

    pub fn with_reset(mut self, reset_on_completion: bool) -> Self {
        self.reset_on_completion = reset_on_completion;
        self
    }
}

/// Isolated worktree settings for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeConfig {
    pub enabled: bool,
    /// Where the worktree lives on disk
    pub path: PathBuf,
    /// Branch the worktree must have checked out
    pub branch_name: String,
    #[serde(default)]
    pub create_pr_on_completion: bool,
    /// Base branch for the pull request (detected when absent)
    #[serde(default)]
    pub pr_target_branch: Option<String>,
    /// Override for the `gh` executable
    #[serde(default)]
    pub gh_path: Option<String>,
}

/// Immutable input for one batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunConfig {
    pub documents: Vec<BatchDocumentEntry>,
    /// Prompt template sent to the agent for every task
    pub prompt: String,
    #[serde(default)]
    pub loop_enabled: bool,
    #[serde(default)]
    pub max_loops: Option<u32>,
    #[serde(default)]
    pub worktree: Option<WorktreeConfig>,
}

impl BatchRunConfig {
    pub fn new(documents: Vec<BatchDocumentEntry>, prompt: impl Into<String>) -> Self {
        Self {
            documents,
            prompt: prompt.into(),
            loop_enabled: false,
            max_loops: None,
            worktree: None,
        }
    }

    /// Enable loop mode with an optional iteration cap
    pub fn with_loop(mut self, max_loops: Option<u32>) -> Self {
        self.loop_enabled = true;
        self.max_loops = max_loops;
        self
    }

    pub fn with_worktree(mut self, worktree: WorktreeConfig) -> Self {
        self.worktree = Some(worktree);
        self
    }

    /// Worktree settings, only when enabled
    pub fn active_worktree(&self) -> Option<&WorktreeConfig> {
        self.worktree.as_ref().filter(|w| w.enabled)
    }

    /// Filenames in configured order
    pub fn filenames(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.filename.clone()).collect()
    }

    /// Whether any document is not reset on completion
    pub fn has_non_reset_documents(&self) -> bool {
        self.documents.iter().any(|d| !d.reset_on_completion)
    }

    /// Reject configurations that can never run
    pub fn validate(&self) -> Result<()> {
        if let Some(doc) = self.documents.iter().find(|d| d.filename.trim().is_empty()) {
            return Err(Error::InvalidInput(format!(
                "document filename must not be empty: {:?}",
                doc
            )));
        }
        if self.max_loops == Some(0) {
            return Err(Error::InvalidInput("maxLoops must be at least 1".to_string()));
        }
        if let Some(worktree) = self.active_worktree() {
            if worktree.branch_name.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "worktree branch name must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserializes_camel_case() {
        let value = serde_json::json!({
            "documents": [
                { "filename": "phase-1" },
                { "filename": "phase-2", "resetOnCompletion": true }
            ],
            "prompt": "Work on {{DOCUMENT_NAME}}",
            "loopEnabled": true,
            "maxLoops": 3,
            "worktree": {
                "enabled": true,
                "path": "/tmp/wt",
                "branchName": "autorun/feature",
                "createPrOnCompletion": true
            }
        });
        let config: BatchRunConfig = serde_json::from_value(value).expect("valid config");
        assert_eq!(config.documents.len(), 2);
        assert!(config.documents[1].reset_on_completion);
        assert_eq!(config.max_loops, Some(3));
        let worktree = config.active_worktree().expect("enabled worktree");
        assert_eq!(worktree.branch_name, "autorun/feature");
        assert!(worktree.pr_target_branch.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled_worktree_is_inactive() {
        let config = BatchRunConfig::new(vec![BatchDocumentEntry::new("a")], "go").with_worktree(
            WorktreeConfig {
                enabled: false,
                path: PathBuf::from("/tmp/wt"),
                branch_name: "b".to_string(),
                create_pr_on_completion: true,
                pr_target_branch: None,
                gh_path: None,
            },
        );
        assert!(config.active_worktree().is_none());
    }

    #[test]
    fn test_validate_rejects_zero_max_loops() {
        let config = BatchRunConfig::new(vec![BatchDocumentEntry::new("a")], "go").with_loop(Some(0));
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_has_non_reset_documents() {
        let all_reset = BatchRunConfig::new(
            vec![
                BatchDocumentEntry::new("a").with_reset(true),
                BatchDocumentEntry::new("b").with_reset(true),
            ],
            "go",
        );
        assert!(!all_reset.has_non_reset_documents());

        let mixed = BatchRunConfig::new(
            vec![
                BatchDocumentEntry::new("a").with_reset(true),
                BatchDocumentEntry::new("b"),
            ],
            "go",
        );
        assert!(mixed.has_non_reset_documents());
    }
}
