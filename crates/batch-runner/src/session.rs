//! Session lookup

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// What the orchestrator needs to know about a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    /// Working directory of the session (the source repository)
    pub cwd: PathBuf,
    #[serde(default)]
    pub group_name: Option<String>,
    /// Agent flavour driving this session, e.g. `claude-code`
    pub tool_type: String,
}

/// Resolves session ids
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<SessionInfo>;
}

/// Session registry held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionDirectory {
    sessions: Arc<RwLock<HashMap<String, SessionInfo>>>,
}

impl InMemorySessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a session
    pub async fn register(&self, session: SessionInfo) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.write().await.remove(session_id)
    }

    /// All sessions, sorted by name
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        sessions
    }
}

#[async_trait]
impl SessionDirectory for InMemorySessionDirectory {
    async fn get(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.read().await.get(session_id).cloned()
    }
}
