//! Cancellation tokens shared between a request's owner and the request itself.

use tokio::sync::watch;

/// Trips every `CancelSignal` cloned from the same pair.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (Canceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx }, CancelSignal { rx })
}

impl Canceller {
    pub fn cancel(&self) {
        // No receivers left means nobody is waiting; nothing to do.
        let _ = self.tx.send(true);
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the `Canceller` is dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}
