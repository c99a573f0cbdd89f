//! The four call shapes and their finished snapshots.
//!
//! A call is a bundle of independently settling facets. The consumer half
//! (`*Call`) goes to the application; the producer half (`*Responder`) stays
//! with the transport, which settles every facet exactly once before its
//! task exits.

use futures::StreamExt;
use pbweb_runtime::DynamicMessage;

use crate::deferred::{Deferred, DeferredSettler, deferred};
use crate::error::RpcError;
use crate::metadata::Metadata;
use crate::output_stream::{RpcOutputStream, RpcOutputStreamController, output_stream};
use crate::sink::{RequestReceiver, RequestSink, request_sink};
use crate::status::RpcStatus;
use crate::transport::MethodInfo;

/// A unary call: one request, one response.
#[derive(Debug)]
pub struct UnaryCall {
    pub method: MethodInfo,
    pub request_headers: Metadata,
    pub request: DynamicMessage,
    /// Settles once initial response metadata arrives.
    pub headers: Deferred<Metadata>,
    pub response: Deferred<DynamicMessage>,
    /// Settles exactly once, strictly after the response.
    pub status: Deferred<RpcStatus>,
    pub trailers: Deferred<Metadata>,
}

/// Producer half of a [`UnaryCall`].
pub struct UnaryResponder {
    pub headers: DeferredSettler<Metadata>,
    pub response: DeferredSettler<DynamicMessage>,
    pub status: DeferredSettler<RpcStatus>,
    pub trailers: DeferredSettler<Metadata>,
}

impl UnaryResponder {
    /// Reject every facet that has not settled yet. Settled facets keep
    /// their value; the terminal transition is idempotent.
    pub fn fail(&self, error: RpcError) {
        self.headers.reject(error.clone());
        self.response.reject(error.clone());
        self.status.reject(error.clone());
        self.trailers.reject(error);
    }
}

impl UnaryCall {
    pub fn new(
        method: MethodInfo,
        request_headers: Metadata,
        request: DynamicMessage,
    ) -> (UnaryCall, UnaryResponder) {
        let (headers_tx, headers) = deferred();
        let (response_tx, response) = deferred();
        let (status_tx, status) = deferred();
        let (trailers_tx, trailers) = deferred();
        (
            UnaryCall {
                method,
                request_headers,
                request,
                headers,
                response,
                status,
                trailers,
            },
            UnaryResponder {
                headers: headers_tx,
                response: response_tx,
                status: status_tx,
                trailers: trailers_tx,
            },
        )
    }

    /// Await all facets and collapse them into one snapshot.
    pub async fn finish(self) -> Result<FinishedUnaryCall, RpcError> {
        let headers = self.headers.wait().await?;
        let response = self.response.wait().await?;
        let status = self.status.wait().await?;
        let trailers = self.trailers.wait().await?;
        Ok(FinishedUnaryCall {
            method: self.method,
            request_headers: self.request_headers,
            request: self.request,
            headers,
            response,
            status,
            trailers,
        })
    }
}

/// Snapshot of a completed unary call.
#[derive(Clone, Debug)]
pub struct FinishedUnaryCall {
    pub method: MethodInfo,
    pub request_headers: Metadata,
    pub request: DynamicMessage,
    pub headers: Metadata,
    pub response: DynamicMessage,
    pub status: RpcStatus,
    pub trailers: Metadata,
}

/// A server-streaming call: one request, a stream of responses.
#[derive(Debug)]
pub struct ServerStreamingCall {
    pub method: MethodInfo,
    pub request_headers: Metadata,
    pub request: DynamicMessage,
    pub headers: Deferred<Metadata>,
    /// The response stream. Not clonable: one consumer per call.
    pub responses: RpcOutputStream<DynamicMessage>,
    /// Settles strictly after the last streamed response.
    pub status: Deferred<RpcStatus>,
    pub trailers: Deferred<Metadata>,
}

/// Producer half of a [`ServerStreamingCall`].
pub struct ServerStreamingResponder {
    pub headers: DeferredSettler<Metadata>,
    pub responses: RpcOutputStreamController<DynamicMessage>,
    pub status: DeferredSettler<RpcStatus>,
    pub trailers: DeferredSettler<Metadata>,
}

impl ServerStreamingResponder {
    /// Reject every unsettled facet and terminate the stream with the error.
    pub fn fail(&mut self, error: RpcError) {
        self.headers.reject(error.clone());
        self.responses.try_error(error.clone());
        self.status.reject(error.clone());
        self.trailers.reject(error);
    }
}

impl ServerStreamingCall {
    pub fn new(
        method: MethodInfo,
        request_headers: Metadata,
        request: DynamicMessage,
    ) -> (ServerStreamingCall, ServerStreamingResponder) {
        let (headers_tx, headers) = deferred();
        let (responses_tx, responses) = output_stream();
        let (status_tx, status) = deferred();
        let (trailers_tx, trailers) = deferred();
        (
            ServerStreamingCall {
                method,
                request_headers,
                request,
                headers,
                responses,
                status,
                trailers,
            },
            ServerStreamingResponder {
                headers: headers_tx,
                responses: responses_tx,
                status: status_tx,
                trailers: trailers_tx,
            },
        )
    }

    /// Await all facets, draining the response stream into a vector.
    pub async fn finish(mut self) -> Result<FinishedServerStreamingCall, RpcError> {
        let headers = self.headers.wait().await?;
        let mut responses = Vec::new();
        while let Some(item) = self.responses.next().await {
            responses.push(item?);
        }
        let status = self.status.wait().await?;
        let trailers = self.trailers.wait().await?;
        Ok(FinishedServerStreamingCall {
            method: self.method,
            request_headers: self.request_headers,
            request: self.request,
            headers,
            responses,
            status,
            trailers,
        })
    }
}

/// Snapshot of a completed server-streaming call.
#[derive(Clone, Debug)]
pub struct FinishedServerStreamingCall {
    pub method: MethodInfo,
    pub request_headers: Metadata,
    pub request: DynamicMessage,
    pub headers: Metadata,
    pub responses: Vec<DynamicMessage>,
    pub status: RpcStatus,
    pub trailers: Metadata,
}

/// A client-streaming call: a stream of requests, one response.
#[derive(Debug)]
pub struct ClientStreamingCall {
    pub method: MethodInfo,
    pub request_headers: Metadata,
    /// Send requests here, then call `complete()`.
    pub requests: RequestSink<DynamicMessage>,
    pub headers: Deferred<Metadata>,
    pub response: Deferred<DynamicMessage>,
    pub status: Deferred<RpcStatus>,
    pub trailers: Deferred<Metadata>,
}

/// Producer half of a [`ClientStreamingCall`].
pub struct ClientStreamingResponder {
    /// The caller's request messages, ending when the sink completes.
    pub requests: RequestReceiver<DynamicMessage>,
    pub headers: DeferredSettler<Metadata>,
    pub response: DeferredSettler<DynamicMessage>,
    pub status: DeferredSettler<RpcStatus>,
    pub trailers: DeferredSettler<Metadata>,
}

impl ClientStreamingResponder {
    pub fn fail(&self, error: RpcError) {
        self.headers.reject(error.clone());
        self.response.reject(error.clone());
        self.status.reject(error.clone());
        self.trailers.reject(error);
    }
}

impl ClientStreamingCall {
    pub fn new(
        method: MethodInfo,
        request_headers: Metadata,
    ) -> (ClientStreamingCall, ClientStreamingResponder) {
        let (requests, requests_rx) = request_sink();
        let (headers_tx, headers) = deferred();
        let (response_tx, response) = deferred();
        let (status_tx, status) = deferred();
        let (trailers_tx, trailers) = deferred();
        (
            ClientStreamingCall {
                method,
                request_headers,
                requests,
                headers,
                response,
                status,
                trailers,
            },
            ClientStreamingResponder {
                requests: requests_rx,
                headers: headers_tx,
                response: response_tx,
                status: status_tx,
                trailers: trailers_tx,
            },
        )
    }

    /// Await all response facets. The request sink is dropped, which ends
    /// the request stream if `complete()` was not called already.
    pub async fn finish(self) -> Result<FinishedClientStreamingCall, RpcError> {
        drop(self.requests);
        let headers = self.headers.wait().await?;
        let response = self.response.wait().await?;
        let status = self.status.wait().await?;
        let trailers = self.trailers.wait().await?;
        Ok(FinishedClientStreamingCall {
            method: self.method,
            request_headers: self.request_headers,
            headers,
            response,
            status,
            trailers,
        })
    }
}

/// Snapshot of a completed client-streaming call.
#[derive(Clone, Debug)]
pub struct FinishedClientStreamingCall {
    pub method: MethodInfo,
    pub request_headers: Metadata,
    pub headers: Metadata,
    pub response: DynamicMessage,
    pub status: RpcStatus,
    pub trailers: Metadata,
}

/// A duplex call: a stream of requests, a stream of responses.
#[derive(Debug)]
pub struct DuplexStreamingCall {
    pub method: MethodInfo,
    pub request_headers: Metadata,
    pub requests: RequestSink<DynamicMessage>,
    pub headers: Deferred<Metadata>,
    pub responses: RpcOutputStream<DynamicMessage>,
    pub status: Deferred<RpcStatus>,
    pub trailers: Deferred<Metadata>,
}

/// Producer half of a [`DuplexStreamingCall`].
pub struct DuplexStreamingResponder {
    pub requests: RequestReceiver<DynamicMessage>,
    pub headers: DeferredSettler<Metadata>,
    pub responses: RpcOutputStreamController<DynamicMessage>,
    pub status: DeferredSettler<RpcStatus>,
    pub trailers: DeferredSettler<Metadata>,
}

impl DuplexStreamingResponder {
    pub fn fail(&mut self, error: RpcError) {
        self.headers.reject(error.clone());
        self.responses.try_error(error.clone());
        self.status.reject(error.clone());
        self.trailers.reject(error);
    }
}

impl DuplexStreamingCall {
    pub fn new(
        method: MethodInfo,
        request_headers: Metadata,
    ) -> (DuplexStreamingCall, DuplexStreamingResponder) {
        let (requests, requests_rx) = request_sink();
        let (headers_tx, headers) = deferred();
        let (responses_tx, responses) = output_stream();
        let (status_tx, status) = deferred();
        let (trailers_tx, trailers) = deferred();
        (
            DuplexStreamingCall {
                method,
                request_headers,
                requests,
                headers,
                responses,
                status,
                trailers,
            },
            DuplexStreamingResponder {
                requests: requests_rx,
                headers: headers_tx,
                responses: responses_tx,
                status: status_tx,
                trailers: trailers_tx,
            },
        )
    }

    /// Await all response facets, draining the response stream. The request
    /// sink is dropped, ending the request stream.
    pub async fn finish(mut self) -> Result<FinishedDuplexStreamingCall, RpcError> {
        drop(self.requests);
        let headers = self.headers.wait().await?;
        let mut responses = Vec::new();
        while let Some(item) = self.responses.next().await {
            responses.push(item?);
        }
        let status = self.status.wait().await?;
        let trailers = self.trailers.wait().await?;
        Ok(FinishedDuplexStreamingCall {
            method: self.method,
            request_headers: self.request_headers,
            headers,
            responses,
            status,
            trailers,
        })
    }
}

/// Snapshot of a completed duplex call.
#[derive(Clone, Debug)]
pub struct FinishedDuplexStreamingCall {
    pub method: MethodInfo,
    pub request_headers: Metadata,
    pub headers: Metadata,
    pub responses: Vec<DynamicMessage>,
    pub status: RpcStatus,
    pub trailers: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;

    fn test_method() -> MethodInfo {
        MethodInfo::new(
            "shop.OrderService",
            "GetOrder",
            "get_order",
            "shop.GetOrderRequest",
            "shop.Order",
        )
    }

    fn empty_message(name: &str) -> DynamicMessage {
        DynamicMessage::zeroed(&pbweb_runtime::MessageInfo::new(name, Vec::new()))
    }

    #[tokio::test]
    async fn test_unary_finish_in_settle_order() {
        let (call, responder) = UnaryCall::new(
            test_method(),
            Metadata::new(),
            empty_message("shop.GetOrderRequest"),
        );

        responder.headers.resolve(Metadata::new());
        responder.response.resolve(empty_message("shop.Order"));
        responder.status.resolve(RpcStatus::ok());
        responder.trailers.resolve(Metadata::new());

        let finished = call.finish().await.unwrap();
        assert!(finished.status.is_ok());
        assert_eq!(finished.response.type_name(), "shop.Order");
    }

    #[tokio::test]
    async fn test_unary_fail_rejects_unsettled_only() {
        let (call, responder) = UnaryCall::new(
            test_method(),
            Metadata::new(),
            empty_message("shop.GetOrderRequest"),
        );

        responder.headers.resolve(Metadata::new());
        responder.fail(RpcError::new(Code::Unavailable, "gone"));

        // Headers kept their settled value.
        assert!(call.headers.wait().await.is_ok());
        assert_eq!(
            call.status.wait().await.unwrap_err().code(),
            Code::Unavailable
        );
        assert_eq!(
            call.response.wait().await.unwrap_err().code(),
            Code::Unavailable
        );
    }

    #[tokio::test]
    async fn test_server_streaming_finish_collects_responses() {
        let (call, mut responder) = ServerStreamingCall::new(
            test_method().server_streaming(),
            Metadata::new(),
            empty_message("shop.GetOrderRequest"),
        );

        responder.headers.resolve(Metadata::new());
        responder.responses.send(empty_message("shop.Order"));
        responder.responses.send(empty_message("shop.Order"));
        responder.responses.complete();
        responder.status.resolve(RpcStatus::ok());
        responder.trailers.resolve(Metadata::new());

        let finished = call.finish().await.unwrap();
        assert_eq!(finished.responses.len(), 2);
        assert!(finished.status.is_ok());
    }

    #[tokio::test]
    async fn test_client_streaming_requests_reach_responder() {
        let (mut call, mut responder) =
            ClientStreamingCall::new(test_method().client_streaming(), Metadata::new());

        call.requests
            .send(empty_message("shop.GetOrderRequest"))
            .unwrap();
        call.requests.complete();

        assert!(responder.requests.next().await.is_some());
        assert!(responder.requests.next().await.is_none());
    }
}
