//! Request sinks for client-streaming and duplex calls.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::RpcError;

/// Create a linked sink/receiver pair.
///
/// The [`RequestSink`] goes to the caller, the [`RequestReceiver`] to the
/// transport, which reads the caller's messages off it as a stream.
pub fn request_sink<T>() -> (RequestSink<T>, RequestReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RequestSink { tx: Some(tx) }, RequestReceiver { rx })
}

/// The caller's half of the request stream of a client-streaming or duplex
/// call.
///
/// Dropping the sink without calling [`complete`](Self::complete) also ends
/// the request stream.
pub struct RequestSink<T> {
    tx: Option<mpsc::UnboundedSender<T>>,
}

impl<T> std::fmt::Debug for RequestSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSink")
            .field("completed", &self.tx.is_none())
            .finish_non_exhaustive()
    }
}

impl<T> RequestSink<T> {
    /// Send one request message.
    ///
    /// Fails if [`complete`](Self::complete) was already called, or if the
    /// transport stopped reading (the call already settled).
    pub fn send(&mut self, message: T) -> Result<(), RpcError> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            RpcError::invalid_argument("request stream was already completed")
        })?;
        tx.send(message)
            .map_err(|_| RpcError::invalid_argument("request stream is no longer readable"))
    }

    /// Signal that no more requests follow. Idempotent.
    pub fn complete(&mut self) {
        self.tx = None;
    }

    pub fn is_completed(&self) -> bool {
        self.tx.is_none()
    }
}

/// The transport's half: the caller's requests as a stream.
///
/// The stream ends when the caller completes or drops the sink.
pub struct RequestReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Stream for RequestReceiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
