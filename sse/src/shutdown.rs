//! Administrative disconnect signal for streaming sessions.
//!
//! Sessions have no natural cancellation beyond peer-disconnect and the hard
//! timeout; this watch-based signal gives the process (and tests) a way to
//! end every open stream promptly, checked at the top of each loop iteration
//! and able to interrupt the poll sleep and upstream reads.

use tokio::sync::watch;

/// Raising side, held by whoever coordinates process shutdown.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A signal for one session task to watch.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Raise the signal. Idempotent; every subscriber observes it.
    pub fn raise(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Watching side, one clone per session task.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is raised. A dropped handle counts as
    /// raised; the process is tearing down either way.
    pub async fn raised(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
