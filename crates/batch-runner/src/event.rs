//! Event types for agent execution

use serde::{Deserialize, Serialize};

use autorun_core::batch::{AgentError, AgentErrorKind, UsageStats};

use crate::agent::TaskOutcome;

/// Events emitted by the agent during execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Agent announced its conversation handle
    SessionStarted { agent_session_id: String },

    /// Agent sent a message
    Message { content: String },

    /// Token/cost report
    Usage { usage: UsageStats },

    /// Agent encountered an error
    Error { message: String, recoverable: bool },

    /// Agent completed the task
    Completed {
        success: bool,
        summary: Option<String>,
    },

    /// Raw output from the agent
    RawOutput {
        stream: OutputStream,
        content: String,
    },
}

/// Output stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Folds a stream of agent events into a [`TaskOutcome`]
#[derive(Debug, Default)]
pub struct EventCollector {
    agent_session_id: Option<String>,
    usage: Option<UsageStats>,
    last_message: Option<String>,
    completed: Option<(bool, Option<String>)>,
    error: Option<AgentError>,
    stdout: String,
    stderr: String,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::SessionStarted { agent_session_id } => {
                self.agent_session_id = Some(agent_session_id);
            }
            AgentEvent::Message { content } => self.last_message = Some(content),
            AgentEvent::Usage { usage } => {
                self.usage.get_or_insert_with(UsageStats::default).accumulate(&usage);
            }
            AgentEvent::Error {
                message,
                recoverable,
            } => {
                let mut error = AgentError::from_output(message);
                error.recoverable = recoverable;
                self.error = Some(error);
            }
            AgentEvent::Completed { success, summary } => self.completed = Some((success, summary)),
            AgentEvent::RawOutput { stream, content } => {
                let buffer = match stream {
                    OutputStream::Stdout => &mut self.stdout,
                    OutputStream::Stderr => &mut self.stderr,
                };
                buffer.push_str(&content);
                buffer.push('\n');
            }
        }
    }

    /// Build the outcome once the process exited with `exit_code`
    /// (`None` when killed by a signal).
    pub fn finish(self, exit_code: Option<i32>) -> TaskOutcome {
        let exited_cleanly = exit_code == Some(0);

        let mut error = self.error;
        if error.is_none() && !exited_cleanly {
            error = Some(match exit_code {
                None => AgentError::new(AgentErrorKind::AgentCrashed, "agent terminated by signal"),
                Some(code) => {
                    let detail = self.stderr.trim();
                    if detail.is_empty() {
                        AgentError::new(
                            AgentErrorKind::Unknown,
                            format!("agent exited with code {}", code),
                        )
                    } else {
                        AgentError::from_output(detail)
                    }
                }
            });
        }

        let (success, response) = match self.completed {
            Some((success, summary)) => (
                success && error.is_none(),
                summary.or(self.last_message).unwrap_or_default(),
            ),
            None => (
                exited_cleanly && error.is_none(),
                self.last_message
                    .unwrap_or_else(|| self.stdout.trim().to_string()),
            ),
        };

        TaskOutcome {
            success,
            agent_session_id: self.agent_session_id,
            usage_stats: self.usage,
            response,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_prefers_completion_summary() {
        let mut collector = EventCollector::new();
        collector.push(AgentEvent::SessionStarted {
            agent_session_id: "abc".to_string(),
        });
        collector.push(AgentEvent::Message {
            content: "working".to_string(),
        });
        collector.push(AgentEvent::Usage {
            usage: UsageStats {
                input_tokens: 10,
                ..Default::default()
            },
        });
        collector.push(AgentEvent::Completed {
            success: true,
            summary: Some("done".to_string()),
        });

        let outcome = collector.finish(Some(0));
        assert!(outcome.success);
        assert_eq!(outcome.response, "done");
        assert_eq!(outcome.agent_session_id.as_deref(), Some("abc"));
        assert_eq!(outcome.usage_stats.unwrap().input_tokens, 10);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_collector_raw_output_and_failure_exit() {
        let mut collector = EventCollector::new();
        collector.push(AgentEvent::RawOutput {
            stream: OutputStream::Stdout,
            content: "partial".to_string(),
        });
        collector.push(AgentEvent::RawOutput {
            stream: OutputStream::Stderr,
            content: "Error: 429 rate limit exceeded".to_string(),
        });

        let outcome = collector.finish(Some(1));
        assert!(!outcome.success);
        assert_eq!(outcome.response, "partial");
        let error = outcome.error.expect("exit code 1 produces an error");
        assert_eq!(error.kind, AgentErrorKind::RateLimit);
    }

    #[test]
    fn test_collector_signal_is_crash() {
        let outcome = EventCollector::new().finish(None);
        assert_eq!(outcome.error.unwrap().kind, AgentErrorKind::AgentCrashed);
    }

    #[test]
    fn test_collector_explicit_error_event() {
        let mut collector = EventCollector::new();
        collector.push(AgentEvent::Error {
            message: "Invalid API key".to_string(),
            recoverable: true,
        });
        collector.push(AgentEvent::Completed {
            success: false,
            summary: None,
        });
        let outcome = collector.finish(Some(0));
        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap().kind, AgentErrorKind::Auth);
    }
}
