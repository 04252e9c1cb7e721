//! Process-shutdown signalling.
//!
//! Cancellation in this system is simply halting the reconcile and poll
//! timers: the sender flips a watch flag once and every loop observing a
//! token exits at its next suspension point.

use tokio::sync::watch;

/// Receiving half, cloned into every long-running loop
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Resolve once shutdown is signalled. Also resolves if the sender is
    /// dropped without signalling, so an orphaned loop cannot outlive the
    /// process that launched it.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

/// Sending half, held by the composition root
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
