//! Batch run scenarios against scripted agent and version-control fakes

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use autorun_core::batch::{
    AgentError, AgentErrorKind, BatchDocumentEntry, BatchRunConfig, BatchRunState, HistoryDetail,
    RunHistoryEntry, UsageStats, WorktreeConfig,
};
use autorun_core::template::PlaceholderTemplate;
use git_worktree::{PullRequest, RepoStatus, VersionControl, WorktreeError, WorktreeSetup};

use super::{BatchOrchestrator, Collaborators, RunEvent};
use crate::agent::{AgentRunner, SynopsisOutcome, SynopsisRequest, TaskOutcome};
use crate::config::RunnerConfig;
use crate::documents::FsDocumentStore;
use crate::error::BatchError;
use crate::history::HistorySink;
use crate::session::{InMemorySessionDirectory, SessionInfo};

const SESSION: &str = "session-1";

// ============================================================================
// Fakes
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    /// Check off the first `n` unchecked tasks
    Check(usize),
    /// Leave the document untouched
    Nothing,
    /// Report an agent error without touching the document
    Fail(AgentErrorKind),
    /// Check one task and append a new one
    CheckAndAdd,
    /// Check one task, then wait for the test to release the agent
    CheckThenBlock,
}

/// Agent whose prompt is the document name it should work on
struct ScriptedAgent {
    folder: PathBuf,
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    entered: Notify,
    release: Notify,
}

impl ScriptedAgent {
    fn new(folder: &Path, steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            folder: folder.to_path_buf(),
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn check_first(path: &Path, n: usize) {
    let content = std::fs::read_to_string(path).unwrap();
    let mut remaining = n;
    let mut out = String::new();
    for line in content.split_inclusive('\n') {
        if remaining > 0 && line.trim_start().starts_with("- [ ]") {
            out.push_str(&line.replacen("[ ]", "[x]", 1));
            remaining -= 1;
        } else {
            out.push_str(line);
        }
    }
    std::fs::write(path, out).unwrap();
}

fn succeeded() -> TaskOutcome {
    TaskOutcome {
        agent_session_id: Some("agent-session".to_string()),
        usage_stats: Some(UsageStats {
            input_tokens: 100,
            output_tokens: 20,
            total_cost_usd: 0.01,
            ..Default::default()
        }),
        ..TaskOutcome::succeeded("done")
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    async fn run_task(
        &self,
        _session_id: &str,
        prompt: &str,
        _cwd: &Path,
    ) -> crate::Result<TaskOutcome> {
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Check(1));
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = self.folder.join(format!("{}.md", prompt.trim()));

        match step {
            Step::Check(n) => check_first(&path, n),
            Step::Nothing => {}
            Step::Fail(kind) => {
                return Ok(TaskOutcome::failed(AgentError::new(kind, "simulated failure")))
            }
            Step::CheckAndAdd => {
                check_first(&path, 1);
                let mut content = std::fs::read_to_string(&path).unwrap();
                content.push_str("- [ ] follow-up\n");
                std::fs::write(&path, content).unwrap();
            }
            Step::CheckThenBlock => {
                check_first(&path, 1);
                self.entered.notify_one();
                self.release.notified().await;
            }
        }
        Ok(succeeded())
    }

    async fn summarize(
        &self,
        _request: SynopsisRequest<'_>,
    ) -> crate::Result<SynopsisOutcome> {
        Ok(SynopsisOutcome {
            success: true,
            text: Some("**Summary:** Checked a task.\n\n**Details:** Marked it done.".to_string()),
        })
    }
}

#[derive(Default)]
struct FakeVcs {
    fail_setup: bool,
    pull_requests: Mutex<Vec<(PathBuf, String, String)>>,
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn setup_worktree(
        &self,
        _repo_path: &Path,
        worktree_path: &Path,
        branch: &str,
    ) -> git_worktree::Result<WorktreeSetup> {
        if self.fail_setup {
            return Err(WorktreeError::InvalidPath {
                path: worktree_path.to_path_buf(),
            });
        }
        Ok(WorktreeSetup {
            created: true,
            current_branch: branch.to_string(),
            branch_mismatch: false,
        })
    }

    async fn checkout_branch(
        &self,
        _worktree_path: &Path,
        _branch: &str,
        _create_if_missing: bool,
    ) -> git_worktree::Result<()> {
        Ok(())
    }

    async fn get_default_branch(&self, _repo_path: &Path) -> git_worktree::Result<String> {
        Ok("develop".to_string())
    }

    async fn create_pull_request(
        &self,
        cwd: &Path,
        base_branch: &str,
        title: &str,
        _body: &str,
        _gh_path: Option<&str>,
    ) -> git_worktree::Result<PullRequest> {
        self.pull_requests.lock().unwrap().push((
            cwd.to_path_buf(),
            base_branch.to_string(),
            title.to_string(),
        ));
        Ok(PullRequest {
            url: "https://example.test/pull/1".to_string(),
        })
    }

    async fn get_status(&self, _cwd: &Path) -> git_worktree::Result<RepoStatus> {
        Ok(RepoStatus {
            branch: "main".to_string(),
            has_uncommitted_changes: false,
        })
    }
}

#[derive(Default)]
struct RecordingHistory {
    entries: Mutex<Vec<RunHistoryEntry>>,
}

impl RecordingHistory {
    fn details(&self) -> Vec<HistoryDetail> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.detail.clone())
            .collect()
    }

    fn task_entries(&self) -> Vec<RunHistoryEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e.detail, HistoryDetail::Task { .. }))
            .cloned()
            .collect()
    }

    fn loop_summaries(&self) -> Vec<(u32, bool)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.loop_summary())
            .collect()
    }
}

#[async_trait]
impl HistorySink for RecordingHistory {
    async fn append(&self, entry: RunHistoryEntry) -> crate::Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    dir: TempDir,
    agent: Arc<ScriptedAgent>,
    vcs: Arc<FakeVcs>,
    history: Arc<RecordingHistory>,
    orchestrator: BatchOrchestrator,
}

impl Harness {
    async fn new(steps: Vec<Step>) -> Self {
        Self::with_vcs(steps, FakeVcs::default()).await
    }

    async fn with_vcs(steps: Vec<Step>, vcs: FakeVcs) -> Self {
        let dir = TempDir::new().unwrap();
        let agent = ScriptedAgent::new(dir.path(), steps);
        let vcs = Arc::new(vcs);
        let history = Arc::new(RecordingHistory::default());
        let sessions = InMemorySessionDirectory::new();
        sessions
            .register(SessionInfo {
                id: SESSION.to_string(),
                name: "Test session".to_string(),
                cwd: dir.path().to_path_buf(),
                group_name: None,
                tool_type: "claude-code".to_string(),
            })
            .await;

        let orchestrator = BatchOrchestrator::new(
            Collaborators {
                agent: agent.clone(),
                vcs: vcs.clone(),
                documents: Arc::new(FsDocumentStore::new()),
                templates: Arc::new(PlaceholderTemplate),
                history: history.clone(),
                sessions: Arc::new(sessions),
            },
            RunnerConfig {
                debounce: Duration::from_millis(10),
                ..Default::default()
            },
        );

        Self {
            dir,
            agent,
            vcs,
            history,
            orchestrator,
        }
    }

    fn folder(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.dir.path().join(format!("{}.md", name)), content).unwrap();
    }

    fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(format!("{}.md", name))).unwrap()
    }

    async fn wait_for(&self, condition: impl Fn(&BatchRunState) -> bool) -> BatchRunState {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = self.orchestrator.get_state(SESSION).await;
                if condition(&state) {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("state condition not reached")
    }
}

fn config(documents: Vec<BatchDocumentEntry>) -> BatchRunConfig {
    BatchRunConfig::new(documents, "{{DOCUMENT_NAME}}")
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_two_tasks_in_one_invocation() {
    let h = Harness::new(vec![Step::Check(2)]).await;
    h.write("tasks", "- [ ] A\n- [ ] B");

    let info = h
        .orchestrator
        .start_run(SESSION, config(vec![BatchDocumentEntry::new("tasks")]), h.folder())
        .await
        .unwrap()
        .expect("run started");

    assert_eq!(info.completed_tasks, 2);
    assert_eq!(info.total_tasks, 2);
    assert!(!info.was_stopped);
    assert_eq!(h.agent.calls(), 1);

    let tasks = h.history.task_entries();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].success);
    assert_eq!(tasks[0].summary, "Checked a task.");
    assert_eq!(
        tasks[0].detail,
        HistoryDetail::Task {
            document: "tasks".to_string(),
            loop_number: 1,
            tasks_completed: 2
        }
    );
    assert!(matches!(
        h.history.details().last(),
        Some(HistoryDetail::RunSummary {
            completed_tasks: 2,
            was_stopped: false,
            ..
        })
    ));

    let state = h.orchestrator.get_state(SESSION).await;
    assert!(!state.is_running);
    assert!(state.locked_documents.is_empty());
}

#[tokio::test]
async fn test_stalled_document_is_skipped() {
    let h = Harness::new(vec![Step::Nothing, Step::Nothing, Step::Check(1)]).await;
    h.write("stuck", "- [ ] first\n- [ ] second\n");
    h.write("next", "- [ ] only\n");

    let info = h
        .orchestrator
        .start_run(
            SESSION,
            config(vec![
                BatchDocumentEntry::new("stuck"),
                BatchDocumentEntry::new("next"),
            ]),
            h.folder(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.agent.calls(), 3);
    assert_eq!(info.completed_tasks, 1);
    assert!(!info.was_stopped);
    assert_eq!(h.read("stuck"), "- [ ] first\n- [ ] second\n");
    assert_eq!(h.read("next"), "- [x] only\n");
    assert!(h.history.details().contains(&HistoryDetail::Stall {
        document: "stuck".to_string(),
        remaining_tasks: 2,
        consecutive_no_progress: 2,
    }));
}

#[tokio::test]
async fn test_max_loops_one_emits_single_final_summary() {
    let h = Harness::new(vec![Step::CheckAndAdd, Step::Check(1)]).await;
    h.write("tasks", "- [ ] build\n");

    let info = h
        .orchestrator
        .start_run(
            SESSION,
            config(vec![BatchDocumentEntry::new("tasks")]).with_loop(Some(1)),
            h.folder(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.history.loop_summaries(), vec![(1, true)]);
    assert_eq!(info.completed_tasks, 2);
    assert_eq!(info.total_tasks, 2);
    assert!(!info.was_stopped);
}

#[tokio::test]
async fn test_all_reset_documents_loop_until_max() {
    let h = Harness::new(vec![]).await;
    h.write("daily", "- [ ] check logs\n");

    let info = h
        .orchestrator
        .start_run(
            SESSION,
            config(vec![BatchDocumentEntry::new("daily").with_reset(true)]).with_loop(Some(2)),
            h.folder(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.agent.calls(), 2);
    assert_eq!(info.completed_tasks, 2);
    assert_eq!(h.history.loop_summaries(), vec![(1, false), (2, true)]);
    assert_eq!(h.read("daily"), "- [ ] check logs\n");
    assert!(!h.dir.path().join("daily.backup.md").exists());
}

#[tokio::test]
async fn test_loop_ends_when_non_reset_documents_are_done() {
    let h = Harness::new(vec![]).await;
    h.write("feature", "- [ ] implement\n");
    h.write("checks", "- [ ] run tests\n");

    let info = h
        .orchestrator
        .start_run(
            SESSION,
            config(vec![
                BatchDocumentEntry::new("feature"),
                BatchDocumentEntry::new("checks").with_reset(true),
            ])
            .with_loop(None),
            h.folder(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.agent.calls(), 2);
    assert!(!info.was_stopped);
    assert_eq!(h.history.loop_summaries(), vec![(1, true)]);
    assert_eq!(h.read("feature"), "- [x] implement\n");
    assert_eq!(h.read("checks"), "- [ ] run tests\n");
}

#[tokio::test]
async fn test_error_pause_then_resume() {
    let h = Harness::new(vec![Step::Fail(AgentErrorKind::RateLimit), Step::Check(1)]).await;
    h.write("tasks", "- [ ] migrate\n");

    let handle = h
        .orchestrator
        .spawn_run(SESSION, config(vec![BatchDocumentEntry::new("tasks")]), h.folder())
        .await
        .unwrap()
        .expect("run spawned");

    let paused = h.wait_for(|s| s.error_paused).await;
    assert!(paused.is_running);
    assert_eq!(paused.error.as_ref().unwrap().kind, AgentErrorKind::RateLimit);
    assert_eq!(paused.error_document_index, Some(0));
    assert_eq!(paused.error_task_description.as_deref(), Some("migrate"));

    h.orchestrator.resume_after_error(SESSION).await.unwrap();
    let info = handle.await.unwrap();

    assert!(!info.was_stopped);
    assert_eq!(info.completed_tasks, 1);
    assert_eq!(h.read("tasks"), "- [x] migrate\n");
    let outcomes: Vec<bool> = h.history.task_entries().iter().map(|e| e.success).collect();
    assert_eq!(outcomes, vec![false, true]);
    assert!(h.orchestrator.get_state(SESSION).await.error.is_none());
}

#[tokio::test]
async fn test_error_pause_then_abort() {
    let h = Harness::new(vec![Step::Fail(AgentErrorKind::Network)]).await;
    h.write("tasks", "- [ ] deploy\n");

    let handle = h
        .orchestrator
        .spawn_run(SESSION, config(vec![BatchDocumentEntry::new("tasks")]), h.folder())
        .await
        .unwrap()
        .unwrap();

    h.wait_for(|s| s.error_paused).await;
    h.orchestrator.abort_on_error(SESSION).await.unwrap();
    let info = handle.await.unwrap();

    assert!(info.was_stopped);
    assert_eq!(info.completed_tasks, 0);
    assert_eq!(h.agent.calls(), 1);

    let state = h.orchestrator.get_state(SESSION).await;
    assert!(!state.is_running);
    assert!(!state.error_paused);
}

#[tokio::test]
async fn test_skip_document_restores_backup() {
    let h = Harness::new(vec![Step::CheckAndAdd, Step::Fail(AgentErrorKind::Auth)]).await;
    h.write("reset", "- [ ] one\n- [ ] two\n");
    h.write("other", "- [ ] three\n");

    let handle = h
        .orchestrator
        .spawn_run(
            SESSION,
            config(vec![
                BatchDocumentEntry::new("reset").with_reset(true),
                BatchDocumentEntry::new("other"),
            ]),
            h.folder(),
        )
        .await
        .unwrap()
        .unwrap();

    h.wait_for(|s| s.error_paused).await;
    h.orchestrator.skip_current_document(SESSION).await.unwrap();
    let info = handle.await.unwrap();

    assert!(!info.was_stopped);
    assert_eq!(h.read("reset"), "- [ ] one\n- [ ] two\n");
    assert_eq!(h.read("other"), "- [x] three\n");
}

#[tokio::test]
async fn test_stop_restores_open_reset_backup() {
    let h = Harness::new(vec![Step::CheckThenBlock]).await;
    let original = "# Chores\n- [ ] one\n- [ ] two\n";
    h.write("chores", original);

    let run_config = config(vec![BatchDocumentEntry::new("chores").with_reset(true)]).with_loop(None);
    let handle = h
        .orchestrator
        .spawn_run(SESSION, run_config.clone(), h.folder())
        .await
        .unwrap()
        .unwrap();

    h.agent.entered.notified().await;
    assert!(h.orchestrator.is_running(SESSION).await);

    // A second run on the same session is rejected
    let second = h
        .orchestrator
        .spawn_run(SESSION, run_config, h.folder())
        .await;
    assert!(matches!(second, Err(BatchError::AlreadyRunning { .. })));

    h.orchestrator.stop_run(SESSION).await.unwrap();
    h.agent.release.notify_one();
    let info = handle.await.unwrap();

    assert!(info.was_stopped);
    assert_eq!(info.completed_tasks, 1);
    assert_eq!(h.read("chores"), original);
    assert!(!h.dir.path().join("chores.backup.md").exists());
    assert!(!h.orchestrator.is_running(SESSION).await);
    assert!(matches!(
        h.orchestrator.stop_run(SESSION).await,
        Err(BatchError::NotRunning { .. })
    ));
}

#[tokio::test]
async fn test_noop_starts() {
    let h = Harness::new(vec![]).await;
    h.write("done", "- [x] finished\n");

    let unknown = h
        .orchestrator
        .start_run("missing", config(vec![BatchDocumentEntry::new("done")]), h.folder())
        .await
        .unwrap();
    assert!(unknown.is_none());

    let empty = h
        .orchestrator
        .start_run(SESSION, config(vec![]), h.folder())
        .await
        .unwrap();
    assert!(empty.is_none());

    let nothing_to_do = h
        .orchestrator
        .start_run(SESSION, config(vec![BatchDocumentEntry::new("done")]), h.folder())
        .await
        .unwrap();
    assert!(nothing_to_do.is_none());

    assert_eq!(h.agent.calls(), 0);
    assert!(h.history.details().is_empty());
    assert!(!h.orchestrator.get_state(SESSION).await.is_running);
}

fn worktree(h: &Harness) -> WorktreeConfig {
    WorktreeConfig {
        enabled: true,
        path: h.dir.path().join("wt"),
        branch_name: "autorun/tasks".to_string(),
        create_pr_on_completion: true,
        pr_target_branch: None,
        gh_path: None,
    }
}

#[tokio::test]
async fn test_workspace_setup_failure_starts_nothing() {
    let h = Harness::with_vcs(
        vec![],
        FakeVcs {
            fail_setup: true,
            ..Default::default()
        },
    )
    .await;
    h.write("tasks", "- [ ] a\n");

    let result = h
        .orchestrator
        .start_run(
            SESSION,
            config(vec![BatchDocumentEntry::new("tasks")]).with_worktree(worktree(&h)),
            h.folder(),
        )
        .await;

    assert!(matches!(result, Err(BatchError::WorkspaceSetup { .. })));
    assert_eq!(h.agent.calls(), 0);
    assert_eq!(h.history.details(), vec![HistoryDetail::SetupFailure]);
    assert!(!h.orchestrator.is_running(SESSION).await);
}

#[tokio::test]
async fn test_pull_request_after_worktree_run() {
    let h = Harness::new(vec![]).await;
    h.write("tasks", "- [ ] a\n");
    let mut events = h.orchestrator.subscribe_events();

    let info = h
        .orchestrator
        .start_run(
            SESSION,
            config(vec![BatchDocumentEntry::new("tasks")]).with_worktree(worktree(&h)),
            h.folder(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.completed_tasks, 1);

    let pull_requests = h.vcs.pull_requests.lock().unwrap().clone();
    assert_eq!(pull_requests.len(), 1);
    assert_eq!(pull_requests[0].0, h.dir.path().join("wt"));
    assert_eq!(pull_requests[0].1, "develop");

    match events.recv().await.unwrap() {
        RunEvent::PullRequest { result, .. } => {
            assert!(result.success);
            assert_eq!(result.url.as_deref(), Some("https://example.test/pull/1"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        RunEvent::Completed { .. }
    ));
    assert!(h.history.details().contains(&HistoryDetail::PullRequest {
        url: Some("https://example.test/pull/1".to_string()),
        target_branch: "develop".to_string(),
    }));
}

#[tokio::test]
async fn test_host_suspend_stops_the_clock() {
    let h = Harness::new(vec![Step::CheckThenBlock]).await;
    h.write("tasks", "- [ ] a\n");

    let handle = h
        .orchestrator
        .spawn_run(SESSION, config(vec![BatchDocumentEntry::new("tasks")]), h.folder())
        .await
        .unwrap()
        .unwrap();
    h.agent.entered.notified().await;

    h.orchestrator.set_host_active(false).await;
    let suspended = h.orchestrator.get_state(SESSION).await;
    assert!(suspended.last_active_timestamp.is_none());
    let banked = suspended.accumulated_elapsed_ms;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.orchestrator.get_state(SESSION).await.accumulated_elapsed_ms, banked);

    h.orchestrator.set_host_active(true).await;
    assert!(h
        .orchestrator
        .get_state(SESSION)
        .await
        .last_active_timestamp
        .is_some());

    h.agent.release.notify_one();
    let info = handle.await.unwrap();
    assert!(info.elapsed_time_ms >= banked);
}

#[tokio::test]
async fn test_spawn_with_nothing_to_do_releases_the_session() {
    let h = Harness::new(vec![]).await;
    h.write("done", "- [x] finished\n");

    let spawned = h
        .orchestrator
        .spawn_run(SESSION, config(vec![BatchDocumentEntry::new("done")]), h.folder())
        .await
        .unwrap();
    assert!(spawned.is_none());
    assert!(!h.orchestrator.is_running(SESSION).await);
    assert_eq!(h.agent.calls(), 0);

    // The slot is free for a real run
    h.write("todo", "- [ ] next\n");
    let info = h
        .orchestrator
        .start_run(SESSION, config(vec![BatchDocumentEntry::new("todo")]), h.folder())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.completed_tasks, 1);
}

#[tokio::test]
async fn test_stop_after_drained_reset_document_keeps_it_restored() {
    let h = Harness::new(vec![Step::Check(1), Step::CheckThenBlock]).await;
    h.write("reset", "- [ ] r1\n");
    h.write("work", "- [ ] w1\n- [ ] w2\n");

    let run_config = config(vec![
        BatchDocumentEntry::new("reset").with_reset(true),
        BatchDocumentEntry::new("work"),
    ])
    .with_loop(None);
    let handle = h
        .orchestrator
        .spawn_run(SESSION, run_config, h.folder())
        .await
        .unwrap()
        .unwrap();

    // The reset document has drained and been restored by now
    h.agent.entered.notified().await;
    assert_eq!(h.read("reset"), "- [ ] r1\n");

    h.orchestrator.stop_run(SESSION).await.unwrap();
    h.agent.release.notify_one();
    let info = handle.await.unwrap();

    assert!(info.was_stopped);
    assert_eq!(info.completed_tasks, 2);
    assert_eq!(h.read("reset"), "- [ ] r1\n");
    assert_eq!(h.read("work"), "- [x] w1\n- [ ] w2\n");
    assert!(!h.dir.path().join("reset.backup.md").exists());
    assert_eq!(h.history.loop_summaries(), vec![(1, true)]);
}

#[tokio::test]
async fn test_fully_checked_reset_document_is_unchecked_in_loop_mode() {
    let h = Harness::new(vec![]).await;
    h.write("daily", "- [x] a\n- [x] b\n");
    h.write("work", "- [ ] w1\n- [ ] w2\n");

    let run_config = config(vec![
        BatchDocumentEntry::new("daily").with_reset(true),
        BatchDocumentEntry::new("work"),
    ])
    .with_loop(Some(3));
    let info = h
        .orchestrator
        .start_run(SESSION, run_config, h.folder())
        .await
        .unwrap()
        .unwrap();

    // Reset in place and counted, but not worked in the pass that reset it
    assert_eq!(h.read("daily"), "- [ ] a\n- [ ] b\n");
    assert_eq!(h.agent.calls(), 2);
    assert_eq!(info.completed_tasks, 2);
    assert_eq!(info.total_tasks, 4);
    assert!(!info.was_stopped);
    // Every non-reset document is done, so no second loop
    assert_eq!(h.history.loop_summaries(), vec![(1, true)]);
}

#[tokio::test]
async fn test_remove_session_waits_for_the_run() {
    let h = Harness::new(vec![Step::CheckThenBlock]).await;
    h.write("tasks", "- [ ] a\n- [ ] b\n");

    let handle = h
        .orchestrator
        .spawn_run(SESSION, config(vec![BatchDocumentEntry::new("tasks")]), h.folder())
        .await
        .unwrap()
        .unwrap();
    h.agent.entered.notified().await;

    let remover = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.remove_session(SESSION).await })
    };
    // Blocked until the agent returns and the run winds down
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!remover.is_finished());

    h.agent.release.notify_one();
    remover.await.unwrap();
    assert!(!h.orchestrator.is_running(SESSION).await);

    let info = handle.await.unwrap();
    assert!(info.was_stopped);
    assert_eq!(info.completed_tasks, 1);

    // Nothing from the finished run lingers in the progress table
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(
        h.orchestrator.get_state(SESSION).await,
        BatchRunState::default()
    );
}
