//! Agent capability consumed by the orchestrator

use async_trait::async_trait;
use std::path::Path;

use autorun_core::batch::{AgentError, UsageStats};

use crate::error::Result;

/// Result of one agent invocation
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    pub success: bool,
    /// The agent's own conversation handle, used for follow-up synopsis
    pub agent_session_id: Option<String>,
    pub usage_stats: Option<UsageStats>,
    /// Final response text
    pub response: String,
    /// Error the agent signalled while working on the task
    pub error: Option<AgentError>,
}

impl TaskOutcome {
    pub fn succeeded(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: response.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: AgentError) -> Self {
        Self {
            success: false,
            response: error.message.clone(),
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Request for a short synopsis of what a task accomplished
#[derive(Debug, Clone)]
pub struct SynopsisRequest<'a> {
    pub session_id: &'a str,
    pub cwd: &'a Path,
    pub agent_session_id: &'a str,
    pub prompt: &'a str,
    pub tool_type: Option<&'a str>,
}

/// Synopsis text returned by the agent
#[derive(Debug, Clone, Default)]
pub struct SynopsisOutcome {
    pub success: bool,
    pub text: Option<String>,
}

/// Runs tasks on an external coding agent
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run one task to completion in `cwd`
    async fn run_task(&self, session_id: &str, prompt: &str, cwd: &Path) -> Result<TaskOutcome>;

    /// Ask the agent to summarize its last task
    async fn summarize(&self, request: SynopsisRequest<'_>) -> Result<SynopsisOutcome>;
}
