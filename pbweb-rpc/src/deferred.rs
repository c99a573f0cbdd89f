//! Settle-once asynchronous result cells.
//!
//! Every non-streamed facet of a call — headers, unary response, status,
//! trailers — is a [`Deferred`]: a cell its producer settles exactly once and
//! any number of observers can await.

use tokio::sync::watch;

use crate::error::RpcError;

/// Observable lifecycle of a [`Deferred`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferredState {
    Pending,
    Resolved,
    Rejected,
}

enum Cell<T> {
    Pending,
    Done(Result<T, RpcError>),
}

/// Create a linked settler/observer pair.
///
/// The [`DeferredSettler`] is held by the producer (the transport task); the
/// [`Deferred`] is the facet handed to callers. Dropping the settler while
/// still pending rejects all waiters with `CANCELLED`.
pub fn deferred<T: Clone>() -> (DeferredSettler<T>, Deferred<T>) {
    let (tx, rx) = watch::channel(Cell::Pending);
    (DeferredSettler { tx }, Deferred { rx })
}

/// The producing half of a deferred cell.
pub struct DeferredSettler<T> {
    tx: watch::Sender<Cell<T>>,
}

impl<T> DeferredSettler<T> {
    /// Settle the cell with a value. Returns whether this call settled it;
    /// `false` means the cell was already settled and nothing changed.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle the cell with an error. Returns whether this call settled it.
    pub fn reject(&self, error: RpcError) -> bool {
        self.settle(Err(error))
    }

    pub fn state(&self) -> DeferredState {
        match &*self.tx.borrow() {
            Cell::Pending => DeferredState::Pending,
            Cell::Done(Ok(_)) => DeferredState::Resolved,
            Cell::Done(Err(_)) => DeferredState::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == DeferredState::Pending
    }

    fn settle(&self, result: Result<T, RpcError>) -> bool {
        // First settle wins; later calls leave the cell untouched.
        self.tx.send_if_modified(|cell| match cell {
            Cell::Pending => {
                *cell = Cell::Done(result);
                true
            }
            Cell::Done(_) => false,
        })
    }
}

/// The observing half of a deferred cell.
///
/// Cloning gives another independent observer of the same cell.
#[derive(Clone)]
pub struct Deferred<T> {
    rx: watch::Receiver<Cell<T>>,
}

impl<T: Clone> Deferred<T> {
    /// Wait until the cell settles and return a clone of the result.
    ///
    /// If the producer drops its settler while the cell is still pending,
    /// waiters receive `CANCELLED`.
    pub async fn wait(&self) -> Result<T, RpcError> {
        let mut rx = self.rx.clone();
        loop {
            if let Cell::Done(result) = &*rx.borrow_and_update() {
                return result.clone();
            }
            if rx.changed().await.is_err() {
                return Err(RpcError::cancelled("call was discarded"));
            }
        }
    }

    /// The settled result, or `None` while still pending.
    pub fn try_get(&self) -> Option<Result<T, RpcError>> {
        match &*self.rx.borrow() {
            Cell::Pending => None,
            Cell::Done(result) => Some(result.clone()),
        }
    }

    pub fn state(&self) -> DeferredState {
        match &*self.rx.borrow() {
            Cell::Pending => DeferredState::Pending,
            Cell::Done(Ok(_)) => DeferredState::Resolved,
            Cell::Done(Err(_)) => DeferredState::Rejected,
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.rx.borrow() {
            Cell::Pending => "Pending",
            Cell::Done(Ok(_)) => "Resolved",
            Cell::Done(Err(_)) => "Rejected",
        };
        f.debug_tuple("Deferred").field(&state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;

    #[tokio::test]
    async fn test_resolve_once() {
        let (settler, facet) = deferred::<u32>();
        assert_eq!(facet.state(), DeferredState::Pending);
        assert!(facet.try_get().is_none());

        assert!(settler.resolve(7));
        assert_eq!(facet.wait().await.unwrap(), 7);
        assert_eq!(facet.state(), DeferredState::Resolved);
    }

    #[tokio::test]
    async fn test_first_settle_wins() {
        let (settler, facet) = deferred::<u32>();
        assert!(settler.resolve(1));
        assert!(!settler.resolve(2));
        assert!(!settler.reject(RpcError::internal("late")));
        assert_eq!(facet.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reject() {
        let (settler, facet) = deferred::<u32>();
        settler.reject(RpcError::new(Code::Unavailable, "down"));
        let err = facet.wait().await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(facet.state(), DeferredState::Rejected);
    }

    #[tokio::test]
    async fn test_multiple_waiters() {
        let (settler, facet) = deferred::<String>();
        let a = facet.clone();
        let b = facet.clone();
        let wait_a = tokio::spawn(async move { a.wait().await });
        let wait_b = tokio::spawn(async move { b.wait().await });

        settler.resolve("done".to_owned());
        assert_eq!(wait_a.await.unwrap().unwrap(), "done");
        assert_eq!(wait_b.await.unwrap().unwrap(), "done");
    }

    #[tokio::test]
    async fn test_dropped_settler_rejects_waiters() {
        let (settler, facet) = deferred::<u32>();
        drop(settler);
        let err = facet.wait().await.unwrap_err();
        assert_eq!(err.code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn test_settled_value_survives_settler_drop() {
        let (settler, facet) = deferred::<u32>();
        settler.resolve(3);
        drop(settler);
        assert_eq!(facet.wait().await.unwrap(), 3);
    }
}
