//! Process-wide shutdown signal.
//!
//! The trigger side is held by whoever owns the process lifetime (the CLI's
//! Ctrl-C handler); every long-running task holds a cloned [`Shutdown`].

use tokio::sync::watch;

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

#[must_use]
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl Shutdown {
    /// A signal that never fires (one-shot CLI commands).
    #[must_use]
    pub fn never() -> Self {
        let (_trigger, shutdown) = shutdown_channel();
        shutdown
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Trigger dropped without firing: shutdown can no longer happen.
                std::future::pending::<()>().await;
            }
        }
    }
}
