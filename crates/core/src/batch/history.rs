use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage::UsageStats;
use crate::Result;

/// Origin of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryEntryType {
    /// Produced by an automated batch run
    Auto,
}

/// What a history entry records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryDetail {
    /// One agent invocation against a document
    Task {
        document: String,
        loop_number: u32,
        tasks_completed: u32,
    },
    /// A document made no progress and was skipped
    Stall {
        document: String,
        remaining_tasks: u32,
        consecutive_no_progress: u32,
    },
    /// One loop-mode pass finished
    LoopSummary {
        loop_number: u32,
        is_final: bool,
        tasks_completed: u32,
    },
    /// Pull request creation outcome
    PullRequest {
        url: Option<String>,
        target_branch: String,
    },
    /// The run could not start
    SetupFailure,
    /// The whole run finished
    RunSummary {
        completed_tasks: u32,
        total_tasks: u32,
        was_stopped: bool,
        loops_completed: u32,
    },
}

/// Append-only record of something a batch run did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHistoryEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub entry_type: HistoryEntryType,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub summary: String,
    pub full_response: String,
    pub session_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_stats: Option<UsageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    pub detail: HistoryDetail,
}

impl RunHistoryEntry {
    pub fn new(session_id: impl Into<String>, summary: impl Into<String>, detail: HistoryDetail) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_type: HistoryEntryType::Auto,
            timestamp: Utc::now().timestamp_millis(),
            summary: summary.into(),
            full_response: String::new(),
            session_id: session_id.into(),
            success: true,
            usage_stats: None,
            elapsed_time_ms: None,
            agent_session_id: None,
            detail,
        }
    }

    pub fn with_full_response(mut self, full_response: impl Into<String>) -> Self {
        self.full_response = full_response.into();
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn with_usage(mut self, usage_stats: Option<UsageStats>) -> Self {
        self.usage_stats = usage_stats;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_time_ms: u64) -> Self {
        self.elapsed_time_ms = Some(elapsed_time_ms);
        self
    }

    pub fn with_agent_session(mut self, agent_session_id: Option<String>) -> Self {
        self.agent_session_id = agent_session_id;
        self
    }

    /// Loop summary details, when this entry is one
    pub fn loop_summary(&self) -> Option<(u32, bool)> {
        match self.detail {
            HistoryDetail::LoopSummary {
                loop_number,
                is_final,
                ..
            } => Some((loop_number, is_final)),
            _ => None,
        }
    }

    /// Serialize as a single JSONL line (no trailing newline)
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}
