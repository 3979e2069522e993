//! Template variable expansion
//!
//! Prompts and task documents may reference run-scoped variables such as
//! `{{DOCUMENT_NAME}}` or `{{LOOP_NUMBER}}`. Expansion is a pure string
//! transform; the orchestrator only depends on the [`TemplateEngine`] trait.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// Values available to templates during a run
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub session_id: String,
    pub session_name: String,
    /// Directory the agent works in (worktree path when isolated)
    pub agent_path: String,
    pub git_branch: Option<String>,
    pub group_name: Option<String>,
    pub autorun_folder: String,
    /// 1-indexed loop number
    pub loop_number: u32,
    pub document_name: String,
    pub document_path: String,
    pub tool_type: String,
    pub now: Option<DateTime<Utc>>,
}

impl TemplateContext {
    /// Variable table keyed by upper-case name
    pub fn variables(&self) -> HashMap<&'static str, String> {
        let now = self.now.unwrap_or_else(Utc::now);
        HashMap::from([
            ("SESSION_ID", self.session_id.clone()),
            ("SESSION_NAME", self.session_name.clone()),
            ("AGENT_PATH", self.agent_path.clone()),
            ("CWD", self.agent_path.clone()),
            ("GIT_BRANCH", self.git_branch.clone().unwrap_or_default()),
            ("GROUP_NAME", self.group_name.clone().unwrap_or_default()),
            ("AUTORUN_FOLDER", self.autorun_folder.clone()),
            ("LOOP_NUMBER", self.loop_number.to_string()),
            ("DOCUMENT_NAME", self.document_name.clone()),
            ("DOCUMENT_PATH", self.document_path.clone()),
            ("TOOL_TYPE", self.tool_type.clone()),
            ("DATE", now.format("%Y-%m-%d").to_string()),
        ])
    }
}

/// Pure text expansion capability
pub trait TemplateEngine: Send + Sync {
    fn expand(&self, text: &str, context: &TemplateContext) -> String;
}

/// `{{NAME}}` substitution; unknown names are left untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderTemplate;

impl TemplateEngine for PlaceholderTemplate {
    fn expand(&self, text: &str, context: &TemplateContext) -> String {
        if !text.contains("{{") {
            return text.to_string();
        }
        let variables = context.variables();
        PLACEHOLDER
            .replace_all(text, |caps: &Captures| {
                let name = caps[1].to_ascii_uppercase();
                match variables.get(name.as_str()) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}
