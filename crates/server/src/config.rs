//! Server configuration from the environment

use std::path::PathBuf;
use std::time::Duration;

use batch_runner::{AgentType, Result};

/// Runtime settings for the HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    pub agent_type: AgentType,
    /// Extra arguments passed to every agent invocation
    pub agent_args: Vec<String>,
    /// Upper bound for one agent invocation; `None` waits indefinitely
    pub agent_timeout: Option<Duration>,
    pub enable_cors: bool,
}

impl ServerConfig {
    /// Read `AUTORUN_*` variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("AUTORUN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".autorun-data"));

        let port = std::env::var("AUTORUN_PORT")
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(8081);

        let agent_type = match std::env::var("AUTORUN_AGENT") {
            Ok(raw) if !raw.trim().is_empty() => AgentType::from_str(raw.trim())?,
            _ => AgentType::ClaudeCode,
        };

        let agent_args = std::env::var("AUTORUN_AGENT_ARGS")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let agent_timeout =
            parse_timeout_secs(std::env::var("AUTORUN_AGENT_TIMEOUT_SECS").ok().as_deref());

        Ok(Self {
            data_dir,
            port,
            agent_type,
            agent_args,
            agent_timeout,
            enable_cors: env_flag("AUTORUN_ENABLE_CORS", true),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".autorun-data"),
            port: 8081,
            agent_type: AgentType::ClaudeCode,
            agent_args: Vec::new(),
            agent_timeout: None,
            enable_cors: true,
        }
    }
}

/// Whole seconds; zero or anything unparsable disables the limit
fn parse_timeout_secs(raw: Option<&str>) -> Option<Duration> {
    raw.and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn env_flag(name: &str, default: bool) -> bool {
    parse_flag(std::env::var(name).ok().as_deref(), default)
}

fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        None => default,
    }
}
