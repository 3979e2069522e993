//! Batch run module
//!
//! Types shared by the orchestrator, its collaborators and its observers.

mod agent_error;
mod config;
mod history;
mod state;
mod usage;

pub use agent_error::{AgentError, AgentErrorKind};
pub use config::{BatchDocumentEntry, BatchRunConfig, WorktreeConfig};
pub use history::{HistoryDetail, HistoryEntryType, RunHistoryEntry};
pub use state::{BatchRunState, ProgressSnapshot};
pub use usage::UsageStats;
