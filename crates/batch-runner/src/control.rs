//! Cooperative stop flag and the error-pause rendezvous

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch, Mutex};

/// How a paused run should proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorResolution {
    /// Continue the same document
    Resume,
    /// Abandon the current document and move on
    SkipDocument,
    /// Stop the whole run
    Abort,
}

#[derive(Default)]
struct PauseSlot {
    tx: Option<oneshot::Sender<ErrorResolution>>,
    rx: Option<oneshot::Receiver<ErrorResolution>>,
}

/// Control handle for one active run
pub struct RunControl {
    stop: AtomicBool,
    pause: Mutex<PauseSlot>,
    finished: watch::Sender<bool>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self {
            stop: AtomicBool::new(false),
            pause: Mutex::new(PauseSlot::default()),
            finished: watch::Sender::new(false),
        }
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Set the stop flag; a pending pause is settled as abort
    pub async fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.resolve(ErrorResolution::Abort).await;
    }

    /// Open a pending resolution. Returns false when one is already pending.
    pub async fn open_pause(&self) -> bool {
        let mut slot = self.pause.lock().await;
        if slot.tx.is_some() {
            return false;
        }
        let (tx, rx) = oneshot::channel();
        slot.tx = Some(tx);
        slot.rx = Some(rx);
        true
    }

    /// Settle the pending resolution. Returns false when nothing was pending.
    pub async fn resolve(&self, resolution: ErrorResolution) -> bool {
        match self.pause.lock().await.tx.take() {
            Some(tx) => tx.send(resolution).is_ok(),
            None => false,
        }
    }

    /// Wait for the pending resolution, if any.
    ///
    /// Returns `None` when the run is not paused.
    pub async fn wait_for_resolution(&self) -> Option<ErrorResolution> {
        let rx = self.pause.lock().await.rx.take()?;
        Some(rx.await.unwrap_or(ErrorResolution::Abort))
    }

    /// Mark the run as having left the registry
    pub fn mark_finished(&self) {
        self.finished.send_replace(true);
    }

    /// Wait until [`mark_finished`](Self::mark_finished) has been called
    pub async fn wait_finished(&self) {
        let mut rx = self.finished.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|done| *done).await;
    }
}
