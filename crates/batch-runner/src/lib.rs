//! Batch runner for checklist-driven agent runs
//!
//! This crate drives coding agents through markdown task documents:
//! - Sequencing documents and tasks, with loop mode and stall detection
//! - Error pause/resume handled by a human decision
//! - Isolated worktree setup and pull-request creation on completion
//! - Debounced progress broadcast and JSONL run history
//! - Spawning agent CLIs and parsing their output

pub mod agent;
pub mod config;
pub mod control;
pub mod documents;
pub mod error;
pub mod event;
pub mod history;
pub mod orchestrator;
pub mod parser;
pub mod process;
pub mod progress;
pub mod report;
pub mod session;
pub mod workspace;

pub use agent::{AgentRunner, SynopsisOutcome, SynopsisRequest, TaskOutcome};
pub use config::RunnerConfig;
pub use control::ErrorResolution;
pub use documents::{DocumentStore, FsDocumentStore};
pub use error::{BatchError, Result};
pub use event::{AgentEvent, EventCollector, OutputStream};
pub use history::{HistorySink, JsonlHistoryStore};
pub use orchestrator::{BatchOrchestrator, Collaborators, CompletionInfo, PullRequestResult, RunEvent};
pub use process::{AgentType, ProcessAgentRunner};
pub use progress::{ProgressStore, ProgressUpdate};
pub use session::{InMemorySessionDirectory, SessionDirectory, SessionInfo};
pub use workspace::{Workspace, WorkspaceManager};
