//! Output parsers for different agent types

use crate::event::{AgentEvent, OutputStream};
use crate::process::AgentType;

pub mod stream_json;

/// Trait for parsing agent output
pub trait OutputParser: Send + Sync {
    /// Parse a line of output into zero or more events
    fn parse(&mut self, line: &str, stream: OutputStream) -> Vec<AgentEvent>;
}

/// Create a parser for the given agent type
pub fn create_parser(agent_type: AgentType) -> Box<dyn OutputParser> {
    match agent_type {
        AgentType::ClaudeCode => Box::new(stream_json::StreamJsonParser::new()),
        _ => Box::new(DefaultParser),
    }
}

/// A default parser that just returns raw output
pub struct DefaultParser;

impl OutputParser for DefaultParser {
    fn parse(&mut self, line: &str, stream: OutputStream) -> Vec<AgentEvent> {
        vec![AgentEvent::RawOutput {
            stream,
            content: line.to_string(),
        }]
    }
}
