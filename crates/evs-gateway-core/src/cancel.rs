//! Cooperative cancellation signal
//!
//! A clone-able token checked at suspension points (produce, append,
//! registry creation). A timeout is a collaborator cancelling after a
//! deadline; the pipeline itself only observes the signal.

use tokio::sync::watch;

/// Cooperative cancellation signal
///
/// All clones observe the same state. Once cancelled, the signal stays
/// cancelled.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    /// Create a new, uncancelled signal
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Signal cancellation to all clones
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Check whether cancellation has been signaled
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is signaled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}
