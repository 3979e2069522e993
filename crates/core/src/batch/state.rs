use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::agent_error::AgentError;

/// Live state of a session's batch run
///
/// One value exists per session. It is idle (`is_running == false`) between
/// runs and keeps the last run's counters until the next run starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunState {
    pub is_running: bool,
    pub is_stopping: bool,

    pub documents: Vec<String>,
    pub locked_documents: Vec<String>,
    pub current_document_index: usize,
    pub current_doc_tasks_total: u32,
    pub current_doc_tasks_completed: u32,
    pub total_tasks_across_all_docs: u32,
    pub completed_tasks_across_all_docs: u32,

    pub loop_enabled: bool,
    pub loop_iteration: u32,
    pub max_loops: Option<u32>,

    pub worktree_active: bool,
    pub worktree_path: Option<PathBuf>,
    pub worktree_branch: Option<String>,

    /// Active time folded in at each suspend
    pub accumulated_elapsed_ms: u64,
    /// Start of the current active stretch (epoch ms); `None` while suspended
    pub last_active_timestamp: Option<i64>,

    pub error: Option<AgentError>,
    pub error_paused: bool,
    pub error_document_index: Option<usize>,
    pub error_task_description: Option<String>,
}

impl BatchRunState {
    /// Elapsed active time at `now_ms`
    pub fn elapsed_ms(&self, now_ms: i64) -> u64 {
        match self.last_active_timestamp {
            Some(since) => self.accumulated_elapsed_ms + (now_ms - since).max(0) as u64,
            None => self.accumulated_elapsed_ms,
        }
    }

    /// Host went hidden or suspended: bank the active stretch
    pub fn suspend(&mut self, now_ms: i64) {
        if let Some(since) = self.last_active_timestamp.take() {
            self.accumulated_elapsed_ms += (now_ms - since).max(0) as u64;
        }
    }

    /// Host became active again: start a new stretch
    pub fn resume(&mut self, now_ms: i64) {
        if self.last_active_timestamp.is_none() {
            self.last_active_timestamp = Some(now_ms);
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
        self.error_paused = false;
        self.error_document_index = None;
        self.error_task_description = None;
    }

    /// Trimmed view for progress observers; `None` means "nothing to show"
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        if !self.is_running && self.completed_tasks_across_all_docs == 0 {
            return None;
        }
        Some(ProgressSnapshot {
            is_running: self.is_running,
            is_stopping: self.is_stopping,
            current_document: self.documents.get(self.current_document_index).cloned(),
            current_document_index: self.current_document_index,
            document_count: self.documents.len(),
            current_doc_tasks_total: self.current_doc_tasks_total,
            current_doc_tasks_completed: self.current_doc_tasks_completed,
            total_tasks: self.total_tasks_across_all_docs,
            completed_tasks: self.completed_tasks_across_all_docs,
            loop_iteration: self.loop_iteration,
            error_paused: self.error_paused,
        })
    }
}

/// Progress payload broadcast to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub is_running: bool,
    pub is_stopping: bool,
    pub current_document: Option<String>,
    pub current_document_index: usize,
    pub document_count: usize,
    pub current_doc_tasks_total: u32,
    pub current_doc_tasks_completed: u32,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub loop_iteration: u32,
    pub error_paused: bool,
}
