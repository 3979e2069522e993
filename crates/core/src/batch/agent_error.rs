use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Category of an agent failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    Auth,
    RateLimit,
    Network,
    TokenExhaustion,
    AgentCrashed,
    PermissionDenied,
    SessionNotFound,
    Unknown,
}

impl AgentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::TokenExhaustion => "token_exhaustion",
            Self::AgentCrashed => "agent_crashed",
            Self::PermissionDenied => "permission_denied",
            Self::SessionNotFound => "session_not_found",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a human can usually fix this and resume
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::AgentCrashed)
    }

    /// Guess the kind from an agent's error output
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["rate limit", "rate_limit", "too many requests", "429", "overloaded"]) {
            Self::RateLimit
        } else if has(&[
            "unauthorized",
            "invalid api key",
            "authentication",
            "401",
            "please run /login",
            "oauth token",
        ]) {
            Self::Auth
        } else if has(&[
            "prompt is too long",
            "context length",
            "context window",
            "maximum context",
            "token limit",
        ]) {
            Self::TokenExhaustion
        } else if has(&["permission denied", "eacces", "not permitted"]) {
            Self::PermissionDenied
        } else if has(&["no conversation found", "session not found"]) {
            Self::SessionNotFound
        } else if has(&[
            "econnrefused",
            "econnreset",
            "etimedout",
            "enotfound",
            "network",
            "connection refused",
            "socket hang up",
        ]) {
            Self::Network
        } else {
            Self::Unknown
        }
    }
}

impl std::fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by the agent for a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentError {
    #[serde(rename = "type")]
    pub kind: AgentErrorKind,
    pub message: String,
    pub recoverable: bool,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recoverable: kind.is_recoverable(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Build an error from raw agent output, classifying it
    pub fn from_output(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(AgentErrorKind::classify(&message), message)
    }
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}
