//! Runner tuning knobs

use std::time::Duration;

/// Prompt used to ask the agent what it just did
pub const DEFAULT_SYNOPSIS_PROMPT: &str = "Provide a brief synopsis of what you just accomplished in this task using this exact format:\n\n**Summary:** [1-2 sentences describing the key outcome]\n\n**Details:** [A paragraph with more specifics about what was done, files changed, etc.]\n\nRules:\n- Be specific about what was actually accomplished, not what was attempted.\n- Focus only on meaningful work that was done.";

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Coalescing window for non-immediate progress updates
    pub debounce: Duration,
    /// Consecutive no-progress invocations before a document is skipped
    pub stall_threshold: u32,
    pub synopsis_prompt: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            stall_threshold: 2,
            synopsis_prompt: DEFAULT_SYNOPSIS_PROMPT.to_string(),
        }
    }
}
