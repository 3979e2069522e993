//! Task document storage
//!
//! Layout under an autorun folder:
//! ```text
//! <folder>/
//!   phase-1.md          # task document
//!   phase-1.backup.md   # pristine copy while a reset document is being worked
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{BatchError, Result};

const DOCUMENT_SUFFIX: &str = ".md";
const BACKUP_SUFFIX: &str = ".backup.md";

/// Read/write access to checklist documents and their backups
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Filesystem location of a document, as shown to the agent
    fn document_path(&self, folder: &Path, filename: &str) -> PathBuf;

    async fn read_document(&self, folder: &Path, filename: &str) -> Result<String>;

    async fn write_document(&self, folder: &Path, filename: &str, content: &str) -> Result<()>;

    /// Snapshot the current content
    async fn create_backup(&self, folder: &Path, filename: &str) -> Result<()>;

    /// Overwrite the document with its snapshot and drop the snapshot
    async fn restore_backup(&self, folder: &Path, filename: &str) -> Result<()>;

    /// Drop the snapshot; missing backups are not an error
    async fn delete_backup(&self, folder: &Path, filename: &str) -> Result<()>;
}

/// Markdown files on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDocumentStore;

impl FsDocumentStore {
    pub fn new() -> Self {
        Self
    }

    fn stem(filename: &str) -> &str {
        filename.strip_suffix(DOCUMENT_SUFFIX).unwrap_or(filename)
    }

    fn backup_path(folder: &Path, filename: &str) -> PathBuf {
        folder.join(format!("{}{}", Self::stem(filename), BACKUP_SUFFIX))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    fn document_path(&self, folder: &Path, filename: &str) -> PathBuf {
        folder.join(format!("{}{}", Self::stem(filename), DOCUMENT_SUFFIX))
    }

    async fn read_document(&self, folder: &Path, filename: &str) -> Result<String> {
        let path = self.document_path(folder, filename);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| BatchError::Document { path, source })
    }

    async fn write_document(&self, folder: &Path, filename: &str, content: &str) -> Result<()> {
        let path = self.document_path(folder, filename);
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| BatchError::Document { path, source })
    }

    async fn create_backup(&self, folder: &Path, filename: &str) -> Result<()> {
        let path = self.document_path(folder, filename);
        let backup = Self::backup_path(folder, filename);
        tokio::fs::copy(&path, &backup)
            .await
            .map_err(|source| BatchError::Document { path, source })?;
        debug!("Created backup {}", backup.display());
        Ok(())
    }

    async fn restore_backup(&self, folder: &Path, filename: &str) -> Result<()> {
        let backup = Self::backup_path(folder, filename);
        if !tokio::fs::try_exists(&backup).await? {
            return Err(BatchError::BackupMissing { path: backup });
        }
        let path = self.document_path(folder, filename);
        tokio::fs::copy(&backup, &path)
            .await
            .map_err(|source| BatchError::Document { path, source })?;
        tokio::fs::remove_file(&backup).await?;
        debug!("Restored {} from backup", filename);
        Ok(())
    }

    async fn delete_backup(&self, folder: &Path, filename: &str) -> Result<()> {
        match tokio::fs::remove_file(Self::backup_path(folder, filename)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
