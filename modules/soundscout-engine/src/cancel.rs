//! Cooperative cancellation shared across pipeline stages.

use tokio::sync::watch;

/// Cloneable cancellation signal. Every stage holds one and observes it at
/// suspension points; I/O wrappers `select!` on `cancelled()`.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    tx: watch::Sender<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { rx, tx }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        // send_replace never fails: we hold a receiver ourselves.
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation fires. Resolves immediately if it already has.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // wait_for returns immediately when the current value matches
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
