//! Push-based response streams for server-streaming and duplex calls.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::RpcError;

enum Signal<T> {
    Value(T),
    Error(RpcError),
    Complete,
}

/// Create a linked controller/stream pair.
///
/// The controller belongs to the single producer (the transport task), the
/// stream to the single consumer. There is no backpressure: values queue
/// until the consumer polls them.
pub fn output_stream<T>() -> (RpcOutputStreamController<T>, RpcOutputStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        RpcOutputStreamController { tx, closed: false },
        RpcOutputStream { rx, done: false },
    )
}

/// The producing half of an output stream.
///
/// A producer sends zero or more values, then exactly one terminal signal:
/// [`complete`](Self::complete) or [`error`](Self::error). Dropping the
/// controller without a terminal signal surfaces as a `CANCELLED` error to
/// the consumer.
pub struct RpcOutputStreamController<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
    closed: bool,
}

impl<T> RpcOutputStreamController<T> {
    /// Push a value to the consumer.
    ///
    /// # Panics
    ///
    /// Panics if the stream was already completed or errored. Use
    /// [`try_send`](Self::try_send) where the race is legitimate.
    pub fn send(&mut self, value: T) {
        assert!(!self.closed, "stream is closed");
        let _ = self.tx.send(Signal::Value(value));
    }

    /// Push a value unless the stream is already closed. Returns whether the
    /// value was accepted.
    pub fn try_send(&mut self, value: T) -> bool {
        if self.closed {
            return false;
        }
        let _ = self.tx.send(Signal::Value(value));
        true
    }

    /// Terminate the stream with an error. The error is delivered as the
    /// final item.
    ///
    /// # Panics
    ///
    /// Panics if the stream was already completed or errored.
    pub fn error(&mut self, error: RpcError) {
        assert!(!self.closed, "stream is closed");
        self.closed = true;
        let _ = self.tx.send(Signal::Error(error));
    }

    /// Terminate the stream with an error unless already closed. Returns
    /// whether this call closed the stream.
    pub fn try_error(&mut self, error: RpcError) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let _ = self.tx.send(Signal::Error(error));
        true
    }

    /// Terminate the stream successfully.
    ///
    /// # Panics
    ///
    /// Panics if the stream was already completed or errored.
    pub fn complete(&mut self) {
        assert!(!self.closed, "stream is closed");
        self.closed = true;
        let _ = self.tx.send(Signal::Complete);
    }

    /// Terminate successfully unless already closed. Returns whether this
    /// call closed the stream.
    pub fn try_complete(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let _ = self.tx.send(Signal::Complete);
        true
    }

    /// Whether a terminal signal has been sent.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// The consuming half of an output stream.
///
/// Implements [`Stream`] with an error as the final item on failure. The
/// type is deliberately not `Clone`: ownership enforces the single-consumer
/// contract. Dropping the stream detaches the consumer; the producer keeps
/// running and its values are discarded.
pub struct RpcOutputStream<T> {
    rx: mpsc::UnboundedReceiver<Signal<T>>,
    done: bool,
}

impl<T> Stream for RpcOutputStream<T> {
    type Item = Result<T, RpcError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Signal::Value(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Signal::Error(error))) => {
                this.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(Signal::Complete)) => {
                this.done = true;
                Poll::Ready(None)
            }
            // Producer dropped without a terminal signal.
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(Some(Err(RpcError::cancelled(
                    "response stream closed before completion",
                ))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for RpcOutputStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcOutputStream")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_values_then_complete() {
        let (mut ctrl, mut stream) = output_stream::<u32>();
        ctrl.send(1);
        ctrl.send(2);
        ctrl.complete();

        assert_eq!(stream.next().await.unwrap().unwrap(), 1);
        assert_eq!(stream.next().await.unwrap().unwrap(), 2);
        assert!(stream.next().await.is_none());
        // Terminal state is sticky.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_is_final_item() {
        let (mut ctrl, mut stream) = output_stream::<u32>();
        ctrl.send(1);
        ctrl.error(RpcError::new(Code::Unavailable, "lost connection"));

        assert_eq!(stream.next().await.unwrap().unwrap(), 1);
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_controller_without_terminal() {
        let (mut ctrl, mut stream) = output_stream::<u32>();
        ctrl.send(1);
        drop(ctrl);

        assert_eq!(stream.next().await.unwrap().unwrap(), 1);
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Cancelled);
    }

    #[test]
    fn test_try_variants_after_close() {
        let (mut ctrl, _stream) = output_stream::<u32>();
        ctrl.complete();
        assert!(ctrl.is_closed());
        assert!(!ctrl.try_send(1));
        assert!(!ctrl.try_complete());
        assert!(!ctrl.try_error(RpcError::internal("late")));
    }

    #[test]
    #[should_panic(expected = "stream is closed")]
    fn test_send_after_complete_panics() {
        let (mut ctrl, _stream) = output_stream::<u32>();
        ctrl.complete();
        ctrl.send(1);
    }

    #[tokio::test]
    async fn test_detached_consumer_does_not_block_producer() {
        let (mut ctrl, stream) = output_stream::<u32>();
        drop(stream);
        assert!(ctrl.try_send(1));
        assert!(ctrl.try_complete());
    }
}
