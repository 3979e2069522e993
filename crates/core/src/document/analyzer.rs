//! Checklist analysis
//!
//! A task line is a list item (`-` or `*`) followed by a bracket marker and
//! at least one more character. Matching is line-anchored: a marker that
//! appears in the middle of a line is plain text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static UNCHECKED_TASK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s*\[\s*\].+$").unwrap());

static CHECKED_TASK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s*\[[xX✓✔]\].+$").unwrap());

static CHECKED_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*[-*]\s*)\[[xX✓✔]\](.+)$").unwrap());

static UNCHECKED_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s*\[\s*\]\s*(.+)$").unwrap());

/// Checked and unchecked task counts for one document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub unchecked: u32,
    pub checked: u32,
}

impl TaskCounts {
    /// Measure both counts in a single call
    pub fn measure(text: &str) -> Self {
        Self {
            unchecked: count_unfinished_tasks(text),
            checked: count_checked_tasks(text),
        }
    }
}

/// Count unchecked tasks (`- [ ] ...`)
pub fn count_unfinished_tasks(text: &str) -> u32 {
    count_matching(text, &UNCHECKED_TASK)
}

/// Count checked tasks (`- [x] ...`, `- [X]`, `- [✓]`, `- [✔]`)
pub fn count_checked_tasks(text: &str) -> u32 {
    count_matching(text, &CHECKED_TASK)
}

/// Text of the first unchecked task, if any
pub fn first_unfinished_task(text: &str) -> Option<String> {
    lines(text).find_map(|(body, _)| {
        UNCHECKED_TEXT
            .captures(body)
            .map(|caps| caps[1].trim().to_string())
    })
}

/// Reset every checked task back to unchecked.
///
/// Only the bracket contents change; list prefixes, task text and line
/// terminators are preserved byte for byte.
pub fn uncheck_all_tasks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (body, ending) in lines(text) {
        match CHECKED_MARKER.captures(body) {
            Some(caps) => {
                out.push_str(&caps[1]);
                out.push_str("[ ]");
                out.push_str(&caps[2]);
            }
            None => out.push_str(body),
        }
        out.push_str(ending);
    }
    out
}

fn count_matching(text: &str, pattern: &Regex) -> u32 {
    lines(text).filter(|(body, _)| pattern.is_match(body)).count() as u32
}

/// Split text into `(line, terminator)` pairs, accepting `\n`, `\r\n` and `\r`.
fn lines(text: &str) -> impl Iterator<Item = (&str, &str)> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let (body, ending, next) = match rest.find(['\n', '\r']) {
            Some(idx) => {
                let ending_len = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
                (
                    &rest[..idx],
                    &rest[idx..idx + ending_len],
                    &rest[idx + ending_len..],
                )
            }
            None => (rest, "", ""),
        };
        rest = next;
        Some((body, ending))
    })
}
