//! # Cancellation
//!
//! Cancellation signal shared between the controller shutdown path and the
//! store calls and backoff sleeps made during a reconciliation.
//!
//! Built on a `tokio::sync::watch` channel: the handle flips the value to
//! `true` once and every cloned signal observes it.

use std::future::Future;
use tokio::sync::watch;

/// Fires a [`CancellationSignal`]
#[derive(Debug)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Cancel all operations observing the paired signal
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes cancellation requested through a [`CancellationHandle`]
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair
#[must_use]
pub fn cancellation() -> (CancellationHandle, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx }, CancellationSignal { rx })
}

impl CancellationSignal {
    /// A signal that never fires
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested
    ///
    /// Pends forever if the handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            let fired = *rx.borrow_and_update();
            if fired {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `fut` unless cancellation fires first
    ///
    /// Returns `None` without polling `fut` when already cancelled.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            output = fut => Some(output),
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::never()
    }
}
