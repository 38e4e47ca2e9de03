//! Cooperative cancellation for polling loops and host fan-out.
//!
//! A thin wrapper over `tokio::sync::watch`: the trigger side flips the
//! flag once, every `Shutdown` clone observes it. A `Shutdown` whose
//! trigger has been dropped without firing is never cancelled.

use std::time::Duration;

use tokio::sync::watch;

/// Fires the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signal every linked `Shutdown`. Idempotent.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes the shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a linked trigger/observer pair.
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// An observer that can never fire.
    pub fn never() -> Self {
        let (_trigger, shutdown) = Self::new();
        shutdown
    }

    /// Whether the signal has already fired.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires. Pending forever if it never does.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Trigger dropped without firing.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration`. Returns `false` if cancelled first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }
}
