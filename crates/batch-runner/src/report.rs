//! Human-readable summaries and history entries for batch runs

use autorun_core::batch::{HistoryDetail, RunHistoryEntry, UsageStats};

/// Synopsis split into a one-line summary and a longer detail block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synopsis {
    pub short: String,
    pub detail: String,
}

/// Parse agent synopsis text.
///
/// Understands `**Summary:** ...` / `**Details:** ...` sections. Text without
/// them yields its first line as the summary and the whole text as detail.
pub fn parse_synopsis(text: &str) -> Option<Synopsis> {
    let clean = text.replace("**", "");
    let clean = clean.trim();
    if clean.is_empty() {
        return None;
    }

    let summary_at = find_label(clean, "summary:");
    let details_at = find_label(clean, "details:");

    if let Some(start) = summary_at {
        let end = details_at.filter(|&d| d > start).unwrap_or(clean.len());
        let short = collapse(&clean[start + "summary:".len()..end]);
        let detail = details_at
            .map(|d| clean[d + "details:".len()..].trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| short.clone());
        if !short.is_empty() {
            return Some(Synopsis { short, detail });
        }
    }

    let first_line = clean.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(Synopsis {
        short: first_line.to_string(),
        detail: clean.to_string(),
    })
}

fn find_label(text: &str, label: &str) -> Option<usize> {
    text.to_ascii_lowercase().find(label)
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Display name of a document (without the `.md` suffix)
pub fn document_name(filename: &str) -> &str {
    filename.strip_suffix(".md").unwrap_or(filename)
}

/// `1h 2m 3s` style duration
pub fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn usage_lines(usage: Option<&UsageStats>) -> Vec<String> {
    match usage.filter(|u| !u.is_empty()) {
        Some(u) => vec![
            format!(
                "Tokens: {} input, {} output, {} total",
                u.input_tokens,
                u.output_tokens,
                u.total_tokens()
            ),
            format!("Cost: ${:.4}", u.total_cost_usd),
        ],
        None => Vec::new(),
    }
}

/// Fields describing one finished agent invocation
#[derive(Debug, Clone)]
pub struct TaskReport<'a> {
    pub session_id: &'a str,
    pub document: &'a str,
    pub loop_number: u32,
    pub tasks_completed: u32,
    pub success: bool,
    pub synopsis: Option<Synopsis>,
    pub usage: Option<UsageStats>,
    pub elapsed_ms: u64,
    pub agent_session_id: Option<String>,
    /// Error text reported by the agent, if the task failed with one
    pub error: Option<String>,
}

pub fn task_entry(report: TaskReport<'_>) -> RunHistoryEntry {
    let name = document_name(report.document);
    let (summary, full_response) = match report.synopsis {
        Some(synopsis) => (synopsis.short, synopsis.detail),
        None => {
            let line = if report.success {
                format!("{} task completed", name)
            } else {
                format!("{} task failed", name)
            };
            let full_response = match &report.error {
                Some(error) => format!("{}\n\n{}", line, error),
                None => line.clone(),
            };
            (line, full_response)
        }
    };
    RunHistoryEntry::new(
        report.session_id,
        summary,
        HistoryDetail::Task {
            document: report.document.to_string(),
            loop_number: report.loop_number,
            tasks_completed: report.tasks_completed,
        },
    )
    .with_full_response(full_response)
    .with_success(report.success)
    .with_usage(report.usage)
    .with_elapsed_ms(report.elapsed_ms)
    .with_agent_session(report.agent_session_id)
}

pub fn stall_entry(
    session_id: &str,
    document: &str,
    remaining_tasks: u32,
    consecutive_no_progress: u32,
) -> RunHistoryEntry {
    let name = document_name(document);
    let full_response = format!(
        "{} made no progress after {} consecutive attempts: the document was unchanged and no tasks were checked off. \
         {} task(s) remain unchecked. The document was skipped; check whether the remaining tasks are blocked \
         or need clarification.",
        name, consecutive_no_progress, remaining_tasks
    );
    RunHistoryEntry::new(
        session_id,
        format!("{} stalled with {} task(s) remaining", name, remaining_tasks),
        HistoryDetail::Stall {
            document: document.to_string(),
            remaining_tasks,
            consecutive_no_progress,
        },
    )
    .with_full_response(full_response)
    .with_success(false)
}

pub fn loop_summary_entry(
    session_id: &str,
    loop_number: u32,
    is_final: bool,
    tasks_completed: u32,
    elapsed_ms: u64,
    usage: Option<UsageStats>,
) -> RunHistoryEntry {
    let summary = format!(
        "Loop {} completed: {} task(s) accomplished",
        loop_number, tasks_completed
    );
    let mut lines = vec![
        format!("Loop {}{}", loop_number, if is_final { " (final)" } else { "" }),
        format!("Tasks accomplished: {}", tasks_completed),
        format!("Duration: {}", format_duration(elapsed_ms)),
    ];
    lines.extend(usage_lines(usage.as_ref()));

    RunHistoryEntry::new(
        session_id,
        summary,
        HistoryDetail::LoopSummary {
            loop_number,
            is_final,
            tasks_completed,
        },
    )
    .with_full_response(lines.join("\n"))
    .with_usage(usage)
    .with_elapsed_ms(elapsed_ms)
}

/// Final numbers of a run
#[derive(Debug, Clone)]
pub struct RunReport<'a> {
    pub session_id: &'a str,
    pub documents: &'a [String],
    pub completed_tasks: u32,
    pub total_tasks: u32,
    pub was_stopped: bool,
    pub loops_completed: u32,
    pub elapsed_ms: u64,
    pub usage: Option<UsageStats>,
}

pub fn run_summary_entry(report: RunReport<'_>) -> RunHistoryEntry {
    let verb = if report.was_stopped { "stopped" } else { "completed" };
    let summary = format!(
        "Auto Run {}: {} of {} task(s) completed",
        verb, report.completed_tasks, report.total_tasks
    );
    let names: Vec<&str> = report.documents.iter().map(|d| document_name(d)).collect();
    let mut lines = vec![
        format!("Documents: {}", names.join(", ")),
        format!(
            "Tasks: {} of {} completed",
            report.completed_tasks, report.total_tasks
        ),
        format!("Loops: {}", report.loops_completed),
        format!("Duration: {}", format_duration(report.elapsed_ms)),
    ];
    lines.extend(usage_lines(report.usage.as_ref()));

    RunHistoryEntry::new(
        report.session_id,
        summary,
        HistoryDetail::RunSummary {
            completed_tasks: report.completed_tasks,
            total_tasks: report.total_tasks,
            was_stopped: report.was_stopped,
            loops_completed: report.loops_completed,
        },
    )
    .with_full_response(lines.join("\n"))
    .with_success(!report.was_stopped)
    .with_usage(report.usage)
    .with_elapsed_ms(report.elapsed_ms)
}

pub fn setup_failure_entry(session_id: &str, message: &str) -> RunHistoryEntry {
    RunHistoryEntry::new(
        session_id,
        "Auto Run could not start: workspace setup failed",
        HistoryDetail::SetupFailure,
    )
    .with_full_response(message)
    .with_success(false)
}

pub fn pull_request_entry(
    session_id: &str,
    target_branch: &str,
    result: std::result::Result<&str, &str>,
) -> RunHistoryEntry {
    let (summary, full_response, url) = match result {
        Ok(url) => (
            format!("Pull request created against {}", target_branch),
            url.to_string(),
            Some(url.to_string()),
        ),
        Err(message) => (
            format!("Pull request creation against {} failed", target_branch),
            message.to_string(),
            None,
        ),
    };
    let success = url.is_some();
    RunHistoryEntry::new(
        session_id,
        summary,
        HistoryDetail::PullRequest {
            url,
            target_branch: target_branch.to_string(),
        },
    )
    .with_full_response(full_response)
    .with_success(success)
}

pub fn pull_request_title(documents: &[String], completed_tasks: u32) -> String {
    let label = match documents {
        [single] => document_name(single).to_string(),
        _ => format!("{} documents", documents.len()),
    };
    format!("Auto Run: {} ({} task(s) completed)", label, completed_tasks)
}

pub fn pull_request_body(documents: &[String], completed_tasks: u32, elapsed_ms: u64) -> String {
    let mut body = String::from("## Summary\n\nAutomated batch run.\n\n### Documents\n\n");
    for document in documents {
        body.push_str(&format!("- {}\n", document_name(document)));
    }
    body.push_str(&format!(
        "\n**Tasks completed:** {}\n**Duration:** {}\n",
        completed_tasks,
        format_duration(elapsed_ms)
    ));
    body
}
