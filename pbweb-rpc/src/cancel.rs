//! Cooperative per-call cancellation.

use tokio::sync::watch;

/// Create a linked handle/signal pair.
///
/// The caller keeps the [`CancelHandle`]; the [`CancelSignal`] travels in
/// the call options for the transport to observe. Cancellation is
/// cooperative: firing the handle does not unwind anything, the transport
/// notices it at its next await point and drives the call's facets to
/// `CANCELLED`.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// The caller's side: fire it to request cancellation.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// The transport's side: await or poll the cancellation request.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Resolve once cancellation is requested. If the handle is dropped
    /// without cancelling, this future never resolves.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped uncancelled; park forever.
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_fires_signal() {
        let (handle, signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_dropped_handle_never_fires() {
        let (handle, signal) = cancel_pair();
        drop(handle);
        let fired = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            signal.cancelled(),
        )
        .await;
        assert!(fired.is_err());
    }
}
