use serde_json::Value;

use autorun_core::batch::{AgentErrorKind, UsageStats};

use super::OutputParser;
use crate::event::{AgentEvent, OutputStream};

/// Parser for `--output-format stream-json` agent output
pub struct StreamJsonParser;

impl StreamJsonParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StreamJsonParser {
    fn default() -> Self {
        Self::new()
    }
}

fn usage_from(json: &Value) -> Option<UsageStats> {
    let usage = json.get("usage")?;
    let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
    Some(UsageStats {
        input_tokens: field("input_tokens"),
        output_tokens: field("output_tokens"),
        cache_read_input_tokens: field("cache_read_input_tokens"),
        cache_creation_input_tokens: field("cache_creation_input_tokens"),
        total_cost_usd: json
            .get("total_cost_usd")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        context_window: 0,
    })
}

fn assistant_text(json: &Value) -> Option<String> {
    let parts = json.pointer("/message/content")?.as_array()?;
    let text = parts
        .iter()
        .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    (!text.is_empty()).then_some(text)
}

impl OutputParser for StreamJsonParser {
    fn parse(&mut self, line: &str, stream: OutputStream) -> Vec<AgentEvent> {
        let raw = || {
            vec![AgentEvent::RawOutput {
                stream,
                content: line.to_string(),
            }]
        };

        let trimmed = line.trim();
        if stream == OutputStream::Stderr || !trimmed.starts_with('{') {
            return raw();
        }
        let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
            return raw();
        };

        let mut events = Vec::new();
        let session_id = json
            .get("session_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        match json.get("type").and_then(Value::as_str) {
            Some("system") => {
                if let Some(agent_session_id) = session_id {
                    events.push(AgentEvent::SessionStarted { agent_session_id });
                }
            }
            Some("assistant") => {
                if let Some(content) = assistant_text(&json) {
                    events.push(AgentEvent::Message { content });
                }
            }
            Some("result") => {
                if let Some(agent_session_id) = session_id {
                    events.push(AgentEvent::SessionStarted { agent_session_id });
                }
                if let Some(usage) = usage_from(&json) {
                    events.push(AgentEvent::Usage { usage });
                }
                let result = json
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let is_error = json
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if is_error {
                    let message = result.clone().unwrap_or_else(|| "agent reported an error".to_string());
                    events.push(AgentEvent::Error {
                        recoverable: AgentErrorKind::classify(&message).is_recoverable(),
                        message,
                    });
                }
                events.push(AgentEvent::Completed {
                    success: !is_error,
                    summary: result,
                });
            }
            _ => {}
        }

        events
    }
}
