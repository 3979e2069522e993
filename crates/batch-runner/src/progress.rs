//! Per-session progress table with debounced broadcast
//!
//! Non-immediate updates are buffered per session and applied together when
//! the debounce timer fires, producing one notification. Immediate updates
//! flush the buffer first, then apply and notify synchronously.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use autorun_core::batch::{BatchRunState, ProgressSnapshot};

/// Boxed state mutation
pub type Mutation = Box<dyn FnOnce(&mut BatchRunState) + Send>;

/// Notification sent to progress subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub session_id: String,
    /// `None` means the session has nothing to show
    pub snapshot: Option<ProgressSnapshot>,
}

#[derive(Default)]
struct Slot {
    state: BatchRunState,
    pending: Vec<Mutation>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the pending buffer is flushed or dropped
    generation: u64,
}

impl Slot {
    fn flush(&mut self) -> bool {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
        let had_pending = !self.pending.is_empty();
        for mutation in self.pending.drain(..) {
            mutation(&mut self.state);
        }
        had_pending
    }
}

struct Inner {
    slots: Mutex<HashMap<String, Slot>>,
    debounce: Duration,
    tx: broadcast::Sender<ProgressUpdate>,
}

impl Inner {
    fn notify(&self, session_id: &str, state: &BatchRunState) {
        // No receivers is fine
        let _ = self.tx.send(ProgressUpdate {
            session_id: session_id.to_string(),
            snapshot: state.snapshot(),
        });
    }
}

/// Progress store shared between the orchestrator and observers
#[derive(Clone)]
pub struct ProgressStore {
    inner: Arc<Inner>,
}

impl ProgressStore {
    pub fn new(debounce: Duration) -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                debounce,
                tx,
            }),
        }
    }

    /// Current state; an idle slot is created on first lookup
    pub async fn get(&self, session_id: &str) -> BatchRunState {
        let mut slots = self.inner.slots.lock().await;
        slots.entry(session_id.to_string()).or_default().state.clone()
    }

    /// Apply `mutator` now (`immediate`) or within the debounce window
    pub async fn update<F>(&self, session_id: &str, mutator: F, immediate: bool)
    where
        F: FnOnce(&mut BatchRunState) + Send + 'static,
    {
        let mut slots = self.inner.slots.lock().await;
        let slot = slots.entry(session_id.to_string()).or_default();

        if immediate {
            slot.flush();
            mutator(&mut slot.state);
            self.inner.notify(session_id, &slot.state);
            return;
        }

        slot.pending.push(Box::new(mutator));
        if slot.timer.is_none() {
            slot.timer = Some(self.spawn_timer(session_id.to_string(), slot.generation));
        }
    }

    /// Immediate update applied to every running session
    pub async fn update_running<F>(&self, mutator: F)
    where
        F: Fn(&mut BatchRunState) + Send + Sync,
    {
        let mut slots = self.inner.slots.lock().await;
        for (session_id, slot) in slots.iter_mut() {
            slot.flush();
            if slot.state.is_running {
                mutator(&mut slot.state);
                self.inner.notify(session_id, &slot.state);
            }
        }
    }

    /// Tear down a session's slot, cancelling any pending timer
    pub async fn remove(&self, session_id: &str) {
        if let Some(mut slot) = self.inner.slots.lock().await.remove(session_id) {
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
        }
    }

    /// Cancel every pending timer; buffered mutations are dropped
    pub async fn shutdown(&self) {
        let mut slots = self.inner.slots.lock().await;
        for slot in slots.values_mut() {
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
            slot.pending.clear();
            slot.generation += 1;
        }
        debug!("Progress store shut down");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.inner.tx.subscribe()
    }

    fn spawn_timer(&self, session_id: String, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            let mut slots = inner.slots.lock().await;
            let Some(slot) = slots.get_mut(&session_id) else {
                return;
            };
            if slot.generation != generation {
                return;
            }
            // Clear our own handle before flushing so flush does not abort us
            slot.timer = None;
            if slot.flush() {
                inner.notify(&session_id, &slot.state);
            }
        })
    }
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}
