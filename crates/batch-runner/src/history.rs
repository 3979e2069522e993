//! Run history persistence
//!
//! Directory structure:
//! ```text
//! <data_dir>/
//!   history/
//!     {session_id}.jsonl   # one RunHistoryEntry per line, oldest first
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use autorun_core::batch::RunHistoryEntry;

use crate::error::Result;

/// Receives history entries produced by a run
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, entry: RunHistoryEntry) -> Result<()>;
}

/// Append-only JSONL history per session
#[derive(Debug, Clone)]
pub struct JsonlHistoryStore {
    base_dir: PathBuf,
}

impl JsonlHistoryStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: data_dir.as_ref().join("history"),
        }
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", session_id))
    }

    /// Entries for a session, newest first
    pub async fn list(&self, session_id: &str) -> Result<Vec<RunHistoryEntry>> {
        let path = self.session_path(session_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let mut entries = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match RunHistoryEntry::from_json_line(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    "Failed to parse history line {} in {}: {}",
                    line_num + 1,
                    path.display(),
                    e
                ),
            }
        }
        entries.reverse();
        Ok(entries)
    }

    /// Remove a session's history file
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.session_path(session_id);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl HistorySink for JsonlHistoryStore {
    async fn append(&self, entry: RunHistoryEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let mut line = entry.to_json_line()?;
        line.push('\n');

        let path = self.session_path(&entry.session_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended history entry to {}", path.display());
        Ok(())
    }
}
