//! Agent process management

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use autorun_core::batch::{AgentError, AgentErrorKind};

use crate::agent::{AgentRunner, SynopsisOutcome, SynopsisRequest, TaskOutcome};
use crate::error::{BatchError, Result};
use crate::event::{AgentEvent, EventCollector, OutputStream};
use crate::parser::create_parser;

/// Supported agent types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    ClaudeCode,
    OpenCode,
    Codex,
}

impl AgentType {
    /// Parse agent type from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "claude-code" | "claudecode" | "claude" => Ok(Self::ClaudeCode),
            "opencode" => Ok(Self::OpenCode),
            "codex" => Ok(Self::Codex),
            _ => Err(BatchError::InvalidAgentType {
                agent_type: s.to_string(),
            }),
        }
    }

    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::OpenCode => "opencode",
            Self::Codex => "codex",
        }
    }

    /// Get the command to run this agent
    pub fn command(&self) -> &'static str {
        match self {
            Self::ClaudeCode => {
                if cfg!(target_os = "windows") {
                    "claude.cmd"
                } else {
                    "claude"
                }
            }
            Self::OpenCode => {
                if cfg!(target_os = "windows") {
                    "opencode.cmd"
                } else {
                    "opencode"
                }
            }
            Self::Codex => "codex",
        }
    }

    /// Arguments for a fresh, non-interactive task
    pub fn task_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Self::ClaudeCode => &[
                "--print",
                "--verbose",
                "--output-format",
                "stream-json",
                "--dangerously-skip-permissions",
            ],
            Self::OpenCode => &["run"],
            Self::Codex => &["exec", "--full-auto"],
        };
        args.iter().map(|a| a.to_string()).collect()
    }

    /// Arguments to continue an existing agent conversation, if supported
    pub fn resume_args(&self, agent_session_id: &str) -> Option<Vec<String>> {
        match self {
            Self::ClaudeCode => {
                let mut args = self.task_args();
                args.push("--resume".to_string());
                args.push(agent_session_id.to_string());
                Some(args)
            }
            Self::OpenCode => Some(vec![
                "run".to_string(),
                "--session".to_string(),
                agent_session_id.to_string(),
            ]),
            Self::Codex => None,
        }
    }
}

/// [`AgentRunner`] that spawns an agent CLI per task
#[derive(Debug, Clone)]
pub struct ProcessAgentRunner {
    agent_type: AgentType,
    /// Extra arguments placed before the prompt
    extra_args: Vec<String>,
    /// Upper bound for a single invocation
    timeout: Option<Duration>,
}

impl ProcessAgentRunner {
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            extra_args: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Spawn the agent, stream its output through the parser and fold the events
    async fn invoke(&self, args: Vec<String>, prompt: &str, cwd: &Path) -> Result<TaskOutcome> {
        let command = self.agent_type.command();

        info!(
            "Spawning {} in {:?} with prompt: {}",
            command,
            cwd,
            prompt.chars().take(100).collect::<String>()
        );

        let mut cmd = if cfg!(target_os = "windows") && command.ends_with(".cmd") {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            Command::new(command)
        };
        cmd.args(&args)
            .args(&self.extra_args)
            .arg(prompt)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            BatchError::spawn_failed_with_source(format!("Failed to spawn {}: {}", command, e), e)
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BatchError::agent("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BatchError::agent("Failed to capture stderr"))?;

        let (event_tx, mut event_rx) = mpsc::channel::<AgentEvent>(256);
        let agent_type = self.agent_type;

        // Spawn stdout reader
        let stdout_tx = event_tx.clone();
        let stdout_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut parser = create_parser(agent_type);
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("stdout: {}", line);
                for event in parser.parse(&line, OutputStream::Stdout) {
                    if stdout_tx.send(event).await.is_err() {
                        warn!("Event channel closed, stopping stdout reader");
                        return;
                    }
                }
            }
        });

        // Spawn stderr reader
        let stderr_tx = event_tx;
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut parser = create_parser(agent_type);
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("stderr: {}", line);
                for event in parser.parse(&line, OutputStream::Stderr) {
                    if stderr_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });

        let collect = async {
            let mut collector = EventCollector::new();
            while let Some(event) = event_rx.recv().await {
                collector.push(event);
            }
            let status = child.wait().await?;
            let _ = stdout_handle.await;
            let _ = stderr_handle.await;
            Ok::<_, BatchError>(collector.finish(status.code()))
        };

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, collect).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("{} timed out after {:?}", command, limit);
                    Ok(TaskOutcome::failed(AgentError::new(
                        AgentErrorKind::Unknown,
                        format!("agent timed out after {} seconds", limit.as_secs()),
                    )))
                }
            },
            None => collect.await,
        }
    }
}

#[async_trait]
impl AgentRunner for ProcessAgentRunner {
    async fn run_task(&self, session_id: &str, prompt: &str, cwd: &Path) -> Result<TaskOutcome> {
        debug!("Running task for session {}", session_id);
        self.invoke(self.agent_type.task_args(), prompt, cwd).await
    }

    async fn summarize(&self, request: SynopsisRequest<'_>) -> Result<SynopsisOutcome> {
        let Some(args) = self.agent_type.resume_args(request.agent_session_id) else {
            return Ok(SynopsisOutcome::default());
        };
        let outcome = self.invoke(args, request.prompt, request.cwd).await?;
        let text = outcome.response.trim();
        Ok(SynopsisOutcome {
            success: outcome.success,
            text: (!text.is_empty()).then(|| text.to_string()),
        })
    }
}
