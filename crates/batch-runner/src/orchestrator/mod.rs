//! Batch run orchestration
//!
//! A [`BatchOrchestrator`] drives checklist documents through an agent, one
//! task at a time, for any number of sessions concurrently. Each session has
//! at most one active run, tracked by a [`RunControl`] in the control
//! registry and by a row in the [`ProgressStore`].
//!
//! State machine per session:
//! ```text
//! Idle -> Running -> { ErrorPaused <-> Running } -> Stopping -> Idle
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use autorun_core::batch::{
    AgentError, BatchDocumentEntry, BatchRunConfig, BatchRunState, RunHistoryEntry, UsageStats,
    WorktreeConfig,
};
use autorun_core::document::{
    count_unfinished_tasks, first_unfinished_task, uncheck_all_tasks, TaskCounts,
};
use autorun_core::template::{TemplateContext, TemplateEngine};
use git_worktree::VersionControl;

use crate::agent::{AgentRunner, SynopsisOutcome, SynopsisRequest, TaskOutcome};
use crate::config::RunnerConfig;
use crate::control::{ErrorResolution, RunControl};
use crate::documents::DocumentStore;
use crate::error::{BatchError, Result};
use crate::history::HistorySink;
use crate::progress::{ProgressStore, ProgressUpdate};
use crate::report::{self, RunReport, Synopsis, TaskReport};
use crate::session::{SessionDirectory, SessionInfo};
use crate::workspace::{Workspace, WorkspaceManager};

/// External capabilities the orchestrator relies on
#[derive(Clone)]
pub struct Collaborators {
    pub agent: Arc<dyn AgentRunner>,
    pub vcs: Arc<dyn VersionControl>,
    pub documents: Arc<dyn DocumentStore>,
    pub templates: Arc<dyn TemplateEngine>,
    pub history: Arc<dyn HistorySink>,
    pub sessions: Arc<dyn SessionDirectory>,
}

/// Reported once per run when it reaches a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionInfo {
    pub completed_tasks: u32,
    pub total_tasks: u32,
    pub was_stopped: bool,
    pub elapsed_time_ms: u64,
}

/// Outcome of pull-request creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestResult {
    pub success: bool,
    pub url: Option<String>,
    pub error: Option<String>,
    pub target_branch: String,
}

/// Run-level events for subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunEvent {
    Completed {
        session_id: String,
        info: CompletionInfo,
    },
    PullRequest {
        session_id: String,
        result: PullRequestResult,
    },
}

impl RunEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Completed { session_id, .. } | Self::PullRequest { session_id, .. } => session_id,
        }
    }
}

struct Inner {
    collaborators: Collaborators,
    config: RunnerConfig,
    progress: ProgressStore,
    workspace: WorkspaceManager,
    /// Active runs keyed by session id
    controls: Mutex<HashMap<String, Arc<RunControl>>>,
    events: broadcast::Sender<RunEvent>,
    host_active: AtomicBool,
}

/// Drives batch runs for all sessions
#[derive(Clone)]
pub struct BatchOrchestrator {
    inner: Arc<Inner>,
}

impl BatchOrchestrator {
    pub fn new(collaborators: Collaborators, config: RunnerConfig) -> Self {
        let (events, _) = broadcast::channel(1000);
        Self {
            inner: Arc::new(Inner {
                workspace: WorkspaceManager::new(Arc::clone(&collaborators.vcs)),
                progress: ProgressStore::new(config.debounce),
                collaborators,
                config,
                controls: Mutex::new(HashMap::new()),
                events,
                host_active: AtomicBool::new(true),
            }),
        }
    }

    /// Run to completion on the current task.
    ///
    /// Returns `Ok(None)` when nothing was started: unknown session, no
    /// documents, or no unchecked tasks anywhere.
    pub async fn start_run(
        &self,
        session_id: &str,
        config: BatchRunConfig,
        folder_path: impl Into<PathBuf>,
    ) -> Result<Option<CompletionInfo>> {
        let Some(run) = self.begin(session_id, config, folder_path.into()).await? else {
            return Ok(None);
        };
        Ok(Some(self.complete(run).await))
    }

    /// Like [`start_run`](Self::start_run) but drives the run on a spawned task.
    ///
    /// Workspace setup and the pre-scan happen before spawning, so a start
    /// with nothing to do returns `Ok(None)` here and a second run for the
    /// same session is rejected with [`BatchError::AlreadyRunning`]. The
    /// session is already running when the handle is returned.
    pub async fn spawn_run(
        &self,
        session_id: &str,
        config: BatchRunConfig,
        folder_path: impl Into<PathBuf>,
    ) -> Result<Option<JoinHandle<CompletionInfo>>> {
        let Some(run) = self.begin(session_id, config, folder_path.into()).await? else {
            return Ok(None);
        };
        let this = self.clone();
        Ok(Some(tokio::spawn(async move { this.complete(run).await })))
    }

    /// Request a cooperative stop
    pub async fn stop_run(&self, session_id: &str) -> Result<()> {
        let control = self.control(session_id).await?;
        info!("Stop requested for session {}", session_id);
        control.request_stop().await;
        self.inner
            .progress
            .update(session_id, |s| s.is_stopping = true, true)
            .await;
        Ok(())
    }

    /// Signal an agent error and pause the run until a human resolves it
    pub async fn pause_on_error(
        &self,
        session_id: &str,
        error: AgentError,
        document_index: usize,
        task_description: Option<String>,
    ) -> Result<()> {
        let control = self.control(session_id).await?;
        self.pause_with(&control, session_id, error, document_index, task_description)
            .await;
        Ok(())
    }

    /// Clear the error and continue the same document
    pub async fn resume_after_error(&self, session_id: &str) -> Result<()> {
        self.resolve(session_id, ErrorResolution::Resume).await
    }

    /// Clear the error, restore the document's backup and move on
    pub async fn skip_current_document(&self, session_id: &str) -> Result<()> {
        self.resolve(session_id, ErrorResolution::SkipDocument).await
    }

    /// Stop the run from the error pause
    pub async fn abort_on_error(&self, session_id: &str) -> Result<()> {
        let control = self.control(session_id).await?;
        info!("Aborting run for session {} after error", session_id);
        control.request_stop().await;
        self.inner
            .progress
            .update(
                session_id,
                |s| {
                    s.clear_error();
                    s.is_stopping = true;
                },
                true,
            )
            .await;
        Ok(())
    }

    pub async fn get_state(&self, session_id: &str) -> BatchRunState {
        self.inner.progress.get(session_id).await
    }

    pub async fn is_running(&self, session_id: &str) -> bool {
        self.inner.controls.lock().await.contains_key(session_id)
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.inner.progress.subscribe()
    }

    /// Completion and pull-request events
    pub fn subscribe_events(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.events.subscribe()
    }

    /// Host visibility changed; elapsed time only accrues while active
    pub async fn set_host_active(&self, active: bool) {
        if self.inner.host_active.swap(active, Ordering::SeqCst) == active {
            return;
        }
        let now = Utc::now().timestamp_millis();
        debug!("Host active: {}", active);
        self.inner
            .progress
            .update_running(move |s| {
                if active {
                    s.resume(now);
                } else {
                    s.suspend(now);
                }
            })
            .await;
    }

    /// Stop any run for the session and drop its progress slot.
    ///
    /// An active run is stopped and awaited first, so its final updates
    /// cannot recreate the slot.
    pub async fn remove_session(&self, session_id: &str) {
        if let Ok(control) = self.control(session_id).await {
            info!("Stopping run for removed session {}", session_id);
            control.request_stop().await;
            control.wait_finished().await;
        }
        self.inner.progress.remove(session_id).await;
    }

    /// Stop every run and cancel pending progress timers
    pub async fn shutdown(&self) {
        let controls: Vec<_> = self.inner.controls.lock().await.values().cloned().collect();
        for control in controls {
            control.request_stop().await;
        }
        self.inner.progress.shutdown().await;
    }

    async fn control(&self, session_id: &str) -> Result<Arc<RunControl>> {
        self.inner
            .controls
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| BatchError::NotRunning {
                session_id: session_id.to_string(),
            })
    }

    async fn resolve(&self, session_id: &str, resolution: ErrorResolution) -> Result<()> {
        let control = self.control(session_id).await?;
        if !control.resolve(resolution).await {
            warn!(
                "No pending error for session {}, ignoring {:?}",
                session_id, resolution
            );
        }
        self.inner
            .progress
            .update(session_id, |s| s.clear_error(), true)
            .await;
        Ok(())
    }

    async fn pause_with(
        &self,
        control: &RunControl,
        session_id: &str,
        error: AgentError,
        document_index: usize,
        task_description: Option<String>,
    ) {
        warn!(
            "Pausing session {} on {} (document {})",
            session_id, error, document_index
        );
        if !control.open_pause().await {
            debug!("Error pause already pending for session {}", session_id);
        }
        self.inner
            .progress
            .update(
                session_id,
                move |s| {
                    s.error = Some(error);
                    s.error_paused = true;
                    s.error_document_index = Some(document_index);
                    s.error_task_description = task_description;
                },
                true,
            )
            .await;
    }

    /// Resolve the session and take the run slot
    async fn claim(
        &self,
        session_id: &str,
        config: &BatchRunConfig,
    ) -> Result<Option<(SessionInfo, Arc<RunControl>)>> {
        let Some(session) = self.inner.collaborators.sessions.get(session_id).await else {
            warn!("Ignoring batch run for unknown session {}", session_id);
            return Ok(None);
        };
        if config.documents.is_empty() {
            warn!("Ignoring batch run with no documents for session {}", session_id);
            return Ok(None);
        }
        config.validate()?;

        let mut controls = self.inner.controls.lock().await;
        if controls.contains_key(session_id) {
            return Err(BatchError::AlreadyRunning {
                session_id: session_id.to_string(),
            });
        }
        let control = Arc::new(RunControl::new());
        controls.insert(session_id.to_string(), Arc::clone(&control));
        Ok(Some((session, control)))
    }

    /// Claim the session and prepare a run; the slot is released again
    /// when nothing starts.
    async fn begin(
        &self,
        session_id: &str,
        config: BatchRunConfig,
        folder: PathBuf,
    ) -> Result<Option<Run>> {
        let Some((session, control)) = self.claim(session_id, &config).await? else {
            return Ok(None);
        };
        let prepared = self
            .prepare(session, config, folder, Arc::clone(&control))
            .await;
        if !matches!(prepared, Ok(Some(_))) {
            self.release(session_id, &control).await;
        }
        prepared
    }

    async fn complete(&self, run: Run) -> CompletionInfo {
        let session_id = run.session.id.clone();
        let control = Arc::clone(&run.control);
        let info = run.run_to_end().await;
        self.release(&session_id, &control).await;
        info
    }

    async fn release(&self, session_id: &str, control: &RunControl) {
        self.inner.controls.lock().await.remove(session_id);
        control.mark_finished();
    }

    /// Workspace setup, pre-scan and the switch to Running
    async fn prepare(
        &self,
        session: SessionInfo,
        config: BatchRunConfig,
        folder: PathBuf,
        control: Arc<RunControl>,
    ) -> Result<Option<Run>> {
        let inner = &self.inner;

        let workspace = match inner
            .workspace
            .ensure(config.worktree.as_ref(), &session.cwd, &session.cwd)
            .await
        {
            Ok(workspace) => workspace,
            Err(e) => {
                error!("Batch run for session {} not started: {}", session.id, e);
                append(
                    inner.collaborators.history.as_ref(),
                    report::setup_failure_entry(&session.id, &e.to_string()),
                )
                .await;
                return Err(e);
            }
        };

        let mut initial_total = 0;
        for entry in &config.documents {
            match inner
                .collaborators
                .documents
                .read_document(&folder, &entry.filename)
                .await
            {
                Ok(content) => initial_total += count_unfinished_tasks(&content),
                Err(e) => warn!("Skipping {} in pre-scan: {}", entry.filename, e),
            }
        }
        if initial_total == 0 {
            info!(
                "No unchecked tasks in {} document(s) for session {}, not starting",
                config.documents.len(),
                session.id
            );
            return Ok(None);
        }

        let git_branch = match &workspace.worktree {
            Some(worktree) => Some(worktree.branch.clone()),
            None => match inner.collaborators.vcs.get_status(&workspace.effective_cwd).await {
                Ok(status) => Some(status.branch),
                Err(e) => {
                    debug!("No git branch for {}: {}", workspace.effective_cwd.display(), e);
                    None
                }
            },
        };

        let documents = config.filenames();
        let now = Utc::now().timestamp_millis();
        let active = inner.host_active.load(Ordering::SeqCst);
        {
            let documents = documents.clone();
            let loop_enabled = config.loop_enabled;
            let max_loops = config.max_loops;
            let worktree = workspace.worktree.clone();
            inner
                .progress
                .update(
                    &session.id,
                    move |s| {
                        *s = BatchRunState {
                            is_running: true,
                            locked_documents: documents.clone(),
                            documents,
                            total_tasks_across_all_docs: initial_total,
                            loop_enabled,
                            loop_iteration: 1,
                            max_loops,
                            worktree_active: worktree.is_some(),
                            worktree_path: worktree.as_ref().map(|w| w.path.clone()),
                            worktree_branch: worktree.map(|w| w.branch),
                            last_active_timestamp: active.then_some(now),
                            ..Default::default()
                        };
                    },
                    true,
                )
                .await;
        }
        info!(
            "Batch run started for session {}: {} task(s) across {} document(s)",
            session.id,
            initial_total,
            documents.len()
        );

        Ok(Some(Run {
            orchestrator: self.clone(),
            session,
            config,
            folder,
            workspace,
            control,
            git_branch,
            documents,
            total_tasks: initial_total,
            completed_tasks: 0,
            loop_number: 1,
            loop_tasks: 0,
            loop_started_ms: 0,
            run_usage: None,
            loop_usage: None,
            open_backup: None,
        }))
    }
}

async fn append(history: &dyn HistorySink, entry: RunHistoryEntry) {
    if let Err(e) = history.append(entry).await {
        warn!("Failed to record history entry: {}", e);
    }
}

fn accumulate(total: &mut Option<UsageStats>, usage: &UsageStats) {
    total.get_or_insert_with(UsageStats::default).accumulate(usage);
}

/// Why a document's task loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentExit {
    Drained,
    Stalled,
    Skipped,
    Stopped,
}

/// State of one active run
struct Run {
    orchestrator: BatchOrchestrator,
    session: SessionInfo,
    config: BatchRunConfig,
    folder: PathBuf,
    workspace: Workspace,
    control: Arc<RunControl>,
    git_branch: Option<String>,
    documents: Vec<String>,

    total_tasks: u32,
    completed_tasks: u32,
    /// 1-indexed
    loop_number: u32,
    loop_tasks: u32,
    loop_started_ms: u64,
    run_usage: Option<UsageStats>,
    loop_usage: Option<UsageStats>,

    /// Reset document whose backup has not been resolved yet
    open_backup: Option<String>,
}

impl Run {
    fn collaborators(&self) -> &Collaborators {
        &self.orchestrator.inner.collaborators
    }

    async fn update<F>(&self, mutator: F, immediate: bool)
    where
        F: FnOnce(&mut BatchRunState) + Send + 'static,
    {
        self.orchestrator
            .inner
            .progress
            .update(&self.session.id, mutator, immediate)
            .await;
    }

    async fn record(&self, entry: RunHistoryEntry) {
        append(self.collaborators().history.as_ref(), entry).await;
    }

    async fn elapsed_ms(&self) -> u64 {
        self.orchestrator
            .inner
            .progress
            .get(&self.session.id)
            .await
            .elapsed_ms(Utc::now().timestamp_millis())
    }

    async fn publish_totals(&self) {
        let (total, completed) = (self.total_tasks, self.completed_tasks);
        self.update(
            move |s| {
                s.total_tasks_across_all_docs = total;
                s.completed_tasks_across_all_docs = completed;
            },
            false,
        )
        .await;
    }

    async fn read(&self, entry: &BatchDocumentEntry) -> Option<String> {
        match self
            .collaborators()
            .documents
            .read_document(&self.folder, &entry.filename)
            .await
        {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("Could not read {}: {}", entry.filename, e);
                None
            }
        }
    }

    fn template_context(&self, entry: &BatchDocumentEntry) -> TemplateContext {
        TemplateContext {
            session_id: self.session.id.clone(),
            session_name: self.session.name.clone(),
            agent_path: self.workspace.effective_cwd.display().to_string(),
            git_branch: self.git_branch.clone(),
            group_name: self.session.group_name.clone(),
            autorun_folder: self.folder.display().to_string(),
            loop_number: self.loop_number,
            document_name: report::document_name(&entry.filename).to_string(),
            document_path: self
                .collaborators()
                .documents
                .document_path(&self.folder, &entry.filename)
                .display()
                .to_string(),
            tool_type: self.session.tool_type.clone(),
            now: None,
        }
    }

    async fn run_to_end(mut self) -> CompletionInfo {
        let outcome = self.drive().await;
        if let Err(e) = &outcome {
            error!("Batch run for session {} aborted: {}", self.session.id, e);
        }
        self.finalize(outcome.is_err()).await
    }

    /// Passes over the document set until a stop condition
    async fn drive(&mut self) -> Result<()> {
        let documents = self.config.documents.clone();
        loop {
            let mut completed_this_pass = 0;
            for (index, entry) in documents.iter().enumerate() {
                if self.control.is_stopping() {
                    info!("Stop requested, leaving pass before {}", entry.filename);
                    break;
                }
                completed_this_pass += self.process_document(index, entry).await?;
            }

            if !self.config.loop_enabled || self.control.is_stopping() {
                return Ok(());
            }
            if let Some(max_loops) = self.config.max_loops {
                if self.loop_number >= max_loops {
                    info!("Reached max loops ({})", max_loops);
                    return Ok(());
                }
            }
            if completed_this_pass == 0 {
                info!("No tasks completed in loop {}, ending run", self.loop_number);
                return Ok(());
            }
            if self.config.has_non_reset_documents() && !self.non_reset_work_remains().await {
                info!("All non-reset documents are complete, ending run");
                return Ok(());
            }

            self.total_tasks = self.completed_tasks + self.rescan().await;
            self.emit_loop_summary(false).await;

            self.loop_number += 1;
            self.loop_tasks = 0;
            self.loop_usage = None;
            self.loop_started_ms = self.elapsed_ms().await;

            let (loop_number, total) = (self.loop_number, self.total_tasks);
            self.update(
                move |s| {
                    s.loop_iteration = loop_number;
                    s.total_tasks_across_all_docs = total;
                },
                true,
            )
            .await;
            info!("Starting loop {}", loop_number);
        }
    }

    /// Work one document; returns the number of tasks completed in it
    async fn process_document(&mut self, index: usize, entry: &BatchDocumentEntry) -> Result<u32> {
        let documents = Arc::clone(&self.collaborators().documents);
        let agent = Arc::clone(&self.collaborators().agent);
        let templates = Arc::clone(&self.collaborators().templates);
        let session_id = self.session.id.clone();

        let Some(mut content) = self.read(entry).await else {
            return Ok(0);
        };
        let mut counts = TaskCounts::measure(&content);

        if counts.unchecked == 0 {
            if entry.reset_on_completion && self.config.loop_enabled && counts.checked > 0 {
                let reset = uncheck_all_tasks(&content);
                documents
                    .write_document(&self.folder, &entry.filename, &reset)
                    .await?;
                let fresh = count_unfinished_tasks(&reset);
                info!("Reset {} ({} task(s)) for the next loop", entry.filename, fresh);
                self.total_tasks += fresh;
                self.publish_totals().await;
            } else {
                debug!("{} has no unchecked tasks, skipping", entry.filename);
            }
            return Ok(0);
        }

        if entry.reset_on_completion {
            debug_assert!(self.open_backup.is_none(), "a backup is already open");
            match documents.create_backup(&self.folder, &entry.filename).await {
                Ok(()) => self.open_backup = Some(entry.filename.clone()),
                Err(e) => warn!("Could not back up {}: {}", entry.filename, e),
            }
        }

        let mut doc_total = counts.unchecked;
        let mut doc_completed = 0;
        let mut no_progress = 0;
        self.update(
            move |s| {
                s.current_document_index = index;
                s.current_doc_tasks_total = doc_total;
                s.current_doc_tasks_completed = 0;
            },
            false,
        )
        .await;
        info!(
            "Processing {} ({} unchecked task(s))",
            entry.filename, counts.unchecked
        );

        let exit = loop {
            if counts.unchecked == 0 {
                break DocumentExit::Drained;
            }
            if self.control.is_stopping() {
                break DocumentExit::Stopped;
            }

            if let Some(resolution) = self.control.wait_for_resolution().await {
                info!("Error pause on {} resolved: {:?}", entry.filename, resolution);
                match resolution {
                    ErrorResolution::Resume => self.update(|s| s.clear_error(), true).await,
                    ErrorResolution::SkipDocument => {
                        self.update(|s| s.clear_error(), true).await;
                        break DocumentExit::Skipped;
                    }
                    ErrorResolution::Abort => {
                        self.control.request_stop().await;
                        self.update(
                            |s| {
                                s.clear_error();
                                s.is_stopping = true;
                            },
                            true,
                        )
                        .await;
                        break DocumentExit::Stopped;
                    }
                }
                if self.control.is_stopping() {
                    break DocumentExit::Stopped;
                }
                // The document may have been edited while paused
                if let Some(fresh) = self.read(entry).await {
                    content = fresh;
                    counts = TaskCounts::measure(&content);
                    if counts.unchecked == 0 {
                        break DocumentExit::Drained;
                    }
                }
            }

            let context = self.template_context(entry);
            let prompt = templates.expand(&self.config.prompt, &context);
            let expanded = templates.expand(&content, &context);
            if expanded != content {
                documents
                    .write_document(&self.folder, &entry.filename, &expanded)
                    .await?;
                content = expanded;
                counts = TaskCounts::measure(&content);
            }

            let previous = counts;
            let task_description = first_unfinished_task(&content);

            let started = Instant::now();
            let outcome = match agent
                .run_task(&session_id, &prompt, &self.workspace.effective_cwd)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Agent invocation failed for {}: {}", entry.filename, e);
                    TaskOutcome::failed(AgentError::from_output(e.to_string()))
                }
            };
            let task_elapsed_ms = started.elapsed().as_millis() as u64;

            let after = self.read(entry).await.unwrap_or_else(|| content.clone());
            let current = TaskCounts::measure(&after);
            let completed = current.checked.saturating_sub(previous.checked);
            let added = current.unchecked.saturating_sub(previous.unchecked);
            debug!(
                "{}: {} completed, {} added, {} remaining",
                entry.filename, completed, added, current.unchecked
            );

            self.total_tasks += added;
            self.completed_tasks += completed;
            self.loop_tasks += completed;
            doc_total += added;
            doc_completed += completed;
            if let Some(usage) = &outcome.usage_stats {
                accumulate(&mut self.run_usage, usage);
                accumulate(&mut self.loop_usage, usage);
            }
            self.publish_totals().await;
            self.update(
                move |s| {
                    s.current_doc_tasks_total = doc_total;
                    s.current_doc_tasks_completed = doc_completed;
                },
                false,
            )
            .await;

            // A failed invocation pauses the run; the wait happens at the top
            // of the next iteration and does not count toward a stall.
            if let Some(error) = outcome.error.clone() {
                self.orchestrator
                    .pause_with(
                        &self.control,
                        &session_id,
                        error,
                        index,
                        task_description.clone(),
                    )
                    .await;
            } else if after == content && completed == 0 {
                no_progress += 1;
            } else {
                no_progress = 0;
            }
            if no_progress >= self.orchestrator.inner.config.stall_threshold {
                warn!(
                    "{} stalled after {} attempts with {} task(s) remaining",
                    entry.filename, no_progress, current.unchecked
                );
                self.record(report::stall_entry(
                    &session_id,
                    &entry.filename,
                    current.unchecked,
                    no_progress,
                ))
                .await;
                break DocumentExit::Stalled;
            }

            let synopsis = if outcome.success {
                self.synopsis(&outcome).await
            } else {
                None
            };
            self.record(report::task_entry(TaskReport {
                session_id: &session_id,
                document: &entry.filename,
                loop_number: self.loop_number,
                tasks_completed: completed,
                success: outcome.success,
                synopsis,
                usage: outcome.usage_stats,
                elapsed_ms: task_elapsed_ms,
                agent_session_id: outcome.agent_session_id.clone(),
                error: outcome.error.as_ref().map(|e| e.to_string()),
            }))
            .await;

            content = after;
            counts = current;
        };

        self.close_document(entry, exit, doc_completed).await?;
        Ok(doc_completed)
    }

    /// Resolve the document's backup once its task loop has ended
    async fn close_document(
        &mut self,
        entry: &BatchDocumentEntry,
        exit: DocumentExit,
        doc_completed: u32,
    ) -> Result<()> {
        debug!("{} finished: {:?}", entry.filename, exit);
        match exit {
            DocumentExit::Stalled | DocumentExit::Skipped => {
                self.restore_open_backup().await;
            }
            DocumentExit::Drained if entry.reset_on_completion => {
                if doc_completed == 0 {
                    if self.open_backup.take().is_some() {
                        if let Err(e) = self
                            .collaborators()
                            .documents
                            .delete_backup(&self.folder, &entry.filename)
                            .await
                        {
                            warn!("Could not delete backup of {}: {}", entry.filename, e);
                        }
                    }
                    return Ok(());
                }

                if !self.restore_open_backup().await {
                    if let Some(content) = self.read(entry).await {
                        self.collaborators()
                            .documents
                            .write_document(&self.folder, &entry.filename, &uncheck_all_tasks(&content))
                            .await?;
                    }
                }
                info!("Reset {} after completion", entry.filename);

                if self.config.loop_enabled {
                    if let Some(content) = self.read(entry).await {
                        self.total_tasks += count_unfinished_tasks(&content);
                        self.publish_totals().await;
                    }
                }
            }
            DocumentExit::Drained | DocumentExit::Stopped => {}
        }
        Ok(())
    }

    /// Restore the open backup, if any. Returns true when one was restored.
    async fn restore_open_backup(&mut self) -> bool {
        let Some(filename) = self.open_backup.take() else {
            return false;
        };
        match self
            .collaborators()
            .documents
            .restore_backup(&self.folder, &filename)
            .await
        {
            Ok(()) => {
                debug!("Restored backup of {}", filename);
                true
            }
            Err(e) => {
                warn!("Could not restore backup of {}: {}", filename, e);
                false
            }
        }
    }

    async fn rescan(&self) -> u32 {
        let mut remaining = 0;
        for entry in &self.config.documents {
            if let Some(content) = self.read(entry).await {
                remaining += count_unfinished_tasks(&content);
            }
        }
        remaining
    }

    async fn non_reset_work_remains(&self) -> bool {
        for entry in self.config.documents.iter().filter(|d| !d.reset_on_completion) {
            if let Some(content) = self.read(entry).await {
                if count_unfinished_tasks(&content) > 0 {
                    return true;
                }
            }
        }
        false
    }

    async fn synopsis(&self, outcome: &TaskOutcome) -> Option<Synopsis> {
        let agent_session_id = outcome.agent_session_id.as_deref()?;
        let request = SynopsisRequest {
            session_id: &self.session.id,
            cwd: &self.workspace.effective_cwd,
            agent_session_id,
            prompt: &self.orchestrator.inner.config.synopsis_prompt,
            tool_type: Some(self.session.tool_type.as_str()),
        };
        match self.collaborators().agent.summarize(request).await {
            Ok(SynopsisOutcome {
                success: true,
                text: Some(text),
            }) => report::parse_synopsis(&text),
            Ok(_) => {
                debug!("Synopsis returned nothing usable");
                None
            }
            Err(e) => {
                warn!("Synopsis failed: {}", e);
                None
            }
        }
    }

    async fn emit_loop_summary(&self, is_final: bool) {
        let elapsed = self.elapsed_ms().await.saturating_sub(self.loop_started_ms);
        self.record(report::loop_summary_entry(
            &self.session.id,
            self.loop_number,
            is_final,
            self.loop_tasks,
            elapsed,
            self.loop_usage,
        ))
        .await;
    }

    fn pull_request_config(&self) -> Option<&WorktreeConfig> {
        self.workspace.worktree.as_ref()?;
        self.config
            .active_worktree()
            .filter(|w| w.create_pr_on_completion)
    }

    async fn create_pull_request(&self, worktree: &WorktreeConfig, elapsed_ms: u64) {
        let vcs = &self.collaborators().vcs;
        let base = match worktree
            .pr_target_branch
            .as_deref()
            .filter(|b| !b.trim().is_empty())
        {
            Some(branch) => branch.to_string(),
            None => match vcs.get_default_branch(&self.session.cwd).await {
                Ok(branch) => branch,
                Err(e) => {
                    warn!("Could not detect default branch, using main: {}", e);
                    "main".to_string()
                }
            },
        };

        let title = report::pull_request_title(&self.documents, self.completed_tasks);
        let body = report::pull_request_body(&self.documents, self.completed_tasks, elapsed_ms);
        let result = vcs
            .create_pull_request(
                &self.workspace.effective_cwd,
                &base,
                &title,
                &body,
                worktree.gh_path.as_deref(),
            )
            .await;

        let (entry, result) = match result {
            Ok(pr) => {
                info!("Pull request created: {}", pr.url);
                (
                    report::pull_request_entry(&self.session.id, &base, Ok(&pr.url)),
                    PullRequestResult {
                        success: true,
                        url: Some(pr.url),
                        error: None,
                        target_branch: base,
                    },
                )
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Pull request creation failed: {}", message);
                (
                    report::pull_request_entry(&self.session.id, &base, Err(&message)),
                    PullRequestResult {
                        success: false,
                        url: None,
                        error: Some(message),
                        target_branch: base,
                    },
                )
            }
        };
        self.record(entry).await;
        let _ = self.orchestrator.inner.events.send(RunEvent::PullRequest {
            session_id: self.session.id.clone(),
            result,
        });
    }

    /// Terminal cleanup, reporting and the transition back to idle
    async fn finalize(mut self, failed: bool) -> CompletionInfo {
        let was_stopped = failed || self.control.is_stopping();

        if self.open_backup.is_some() {
            info!("Restoring interrupted reset document");
            self.restore_open_backup().await;
        }
        for entry in self.config.documents.iter().filter(|d| d.reset_on_completion) {
            if let Err(e) = self
                .collaborators()
                .documents
                .delete_backup(&self.folder, &entry.filename)
                .await
            {
                warn!("Could not delete backup of {}: {}", entry.filename, e);
            }
        }

        let elapsed_ms = self.elapsed_ms().await;

        if !was_stopped && self.completed_tasks > 0 {
            if let Some(worktree) = self.pull_request_config().cloned() {
                self.create_pull_request(&worktree, elapsed_ms).await;
            }
        }

        if self.config.loop_enabled {
            self.emit_loop_summary(true).await;
        }

        self.record(report::run_summary_entry(RunReport {
            session_id: &self.session.id,
            documents: &self.documents,
            completed_tasks: self.completed_tasks,
            total_tasks: self.total_tasks,
            was_stopped,
            loops_completed: self.loop_number,
            elapsed_ms,
            usage: self.run_usage,
        }))
        .await;

        let (total, completed) = (self.total_tasks, self.completed_tasks);
        let now = Utc::now().timestamp_millis();
        self.update(
            move |s| {
                s.is_running = false;
                s.is_stopping = false;
                s.clear_error();
                s.locked_documents.clear();
                s.total_tasks_across_all_docs = total;
                s.completed_tasks_across_all_docs = completed;
                s.suspend(now);
            },
            true,
        )
        .await;

        let info = CompletionInfo {
            completed_tasks: completed,
            total_tasks: total,
            was_stopped,
            elapsed_time_ms: elapsed_ms,
        };
        info!(
            "Batch run for session {} {}: {}/{} task(s) in {}",
            self.session.id,
            if was_stopped { "stopped" } else { "completed" },
            completed,
            total,
            report::format_duration(elapsed_ms)
        );
        let _ = self.orchestrator.inner.events.send(RunEvent::Completed {
            session_id: self.session.id.clone(),
            info,
        });
        info
    }
}

#[cfg(test)]
mod tests;
