//! Application state

use std::sync::Arc;

use autorun_core::template::PlaceholderTemplate;
use batch_runner::{
    AgentRunner, BatchOrchestrator, Collaborators, FsDocumentStore, InMemorySessionDirectory,
    JsonlHistoryStore, ProcessAgentRunner, RunnerConfig,
};
use git_worktree::{GitCli, VersionControl};

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    orchestrator: BatchOrchestrator,
    sessions: InMemorySessionDirectory,
    history: JsonlHistoryStore,
}

impl AppState {
    /// State backed by the configured agent CLI and git
    pub fn new(config: ServerConfig) -> Self {
        let mut agent = ProcessAgentRunner::new(config.agent_type)
            .with_extra_args(config.agent_args.clone());
        if let Some(limit) = config.agent_timeout {
            agent = agent.with_timeout(limit);
        }
        Self::with_agent(config, Arc::new(agent), Arc::new(GitCli::new()))
    }

    pub fn with_agent(
        config: ServerConfig,
        agent: Arc<dyn AgentRunner>,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        let sessions = InMemorySessionDirectory::new();
        let history = JsonlHistoryStore::new(&config.data_dir);
        let orchestrator = BatchOrchestrator::new(
            Collaborators {
                agent,
                vcs,
                documents: Arc::new(FsDocumentStore::new()),
                templates: Arc::new(PlaceholderTemplate),
                history: Arc::new(history.clone()),
                sessions: Arc::new(sessions.clone()),
            },
            RunnerConfig::default(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator,
                sessions,
                history,
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.inner.orchestrator
    }

    pub fn sessions(&self) -> &InMemorySessionDirectory {
        &self.inner.sessions
    }

    pub fn history(&self) -> &JsonlHistoryStore {
        &self.inner.history
    }
}
