//! A transport with canned responses, for exercising the call runtime
//! without a network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use pbweb_runtime::DynamicMessage;

use crate::call::{
    ClientStreamingCall, DuplexStreamingCall, ServerStreamingCall, ServerStreamingResponder,
    UnaryCall, UnaryResponder,
};
use crate::error::RpcError;
use crate::metadata::Metadata;
use crate::options::CallOptions;
use crate::status::RpcStatus;
use crate::transport::{MethodInfo, RpcTransport};

/// What the transport answers for each facet. Any facet can be forced to an
/// error instead.
#[derive(Clone, Debug)]
pub struct CannedResponse {
    pub headers: Result<Metadata, RpcError>,
    pub messages: Result<Vec<DynamicMessage>, RpcError>,
    pub status: Result<RpcStatus, RpcError>,
    pub trailers: Result<Metadata, RpcError>,
}

impl CannedResponse {
    /// An all-OK response with the given messages.
    pub fn ok(messages: Vec<DynamicMessage>) -> Self {
        Self {
            headers: Ok(Metadata::new()),
            messages: Ok(messages),
            status: Ok(RpcStatus::ok()),
            trailers: Ok(Metadata::new()),
        }
    }

    /// A response failing every facet with the given error.
    pub fn error(error: RpcError) -> Self {
        Self {
            headers: Err(error.clone()),
            messages: Err(error.clone()),
            status: Err(error.clone()),
            trailers: Err(error),
        }
    }
}

/// Everything a call sent, captured for assertions.
#[derive(Clone, Debug, Default)]
pub struct SentCall {
    pub method_path: String,
    pub requests: Vec<DynamicMessage>,
    pub request_meta: Metadata,
}

/// An [`RpcTransport`] that settles every call from a canned response,
/// in protocol order: headers, then messages, then status, then trailers.
///
/// Records every request message and its metadata; [`sent`](Self::sent)
/// returns the log. For client-streaming and duplex calls the log entry is
/// added once the request stream completes.
pub struct TestTransport {
    response: CannedResponse,
    delay: Duration,
    defaults: CallOptions,
    sent: Arc<Mutex<Vec<SentCall>>>,
}

impl TestTransport {
    pub fn new(response: CannedResponse) -> Self {
        Self {
            response,
            delay: Duration::from_millis(1),
            defaults: CallOptions::default(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Pause this long before each facet settles.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Options folded under every call.
    pub fn with_defaults(mut self, defaults: CallOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// The calls made so far.
    pub fn sent(&self) -> Vec<SentCall> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, method: &MethodInfo, requests: Vec<DynamicMessage>, options: &CallOptions) {
        self.sent.lock().unwrap().push(SentCall {
            method_path: method.path(),
            requests,
            request_meta: options.meta.clone(),
        });
    }

    async fn settle_unary(response: CannedResponse, delay: Duration, responder: UnaryResponder) {
        tokio::time::sleep(delay).await;
        match response.headers {
            Ok(headers) => responder.headers.resolve(headers),
            Err(err) => return responder.fail(err),
        };
        tokio::time::sleep(delay).await;
        match response.messages {
            Ok(mut messages) => match messages.pop() {
                Some(message) => responder.response.resolve(message),
                None => return responder.fail(RpcError::data_loss("no response message")),
            },
            Err(err) => return responder.fail(err),
        };
        tokio::time::sleep(delay).await;
        match response.status {
            Ok(status) => responder.status.resolve(status),
            Err(err) => return responder.fail(err),
        };
        match response.trailers {
            Ok(trailers) => {
                responder.trailers.resolve(trailers);
            }
            Err(err) => responder.fail(err),
        };
    }

    async fn settle_streaming(
        response: CannedResponse,
        delay: Duration,
        mut responder: ServerStreamingResponder,
    ) {
        tokio::time::sleep(delay).await;
        match response.headers {
            Ok(headers) => responder.headers.resolve(headers),
            Err(err) => return responder.fail(err),
        };
        match response.messages {
            Ok(messages) => {
                for message in messages {
                    tokio::time::sleep(delay).await;
                    responder.responses.send(message);
                }
                responder.responses.complete();
            }
            Err(err) => return responder.fail(err),
        }
        match response.status {
            Ok(status) => responder.status.resolve(status),
            Err(err) => return responder.fail(err),
        };
        match response.trailers {
            Ok(trailers) => {
                responder.trailers.resolve(trailers);
            }
            Err(err) => responder.fail(err),
        };
    }
}

impl RpcTransport for TestTransport {
    fn merge_options(&self, options: CallOptions) -> CallOptions {
        CallOptions::merge(self.defaults.clone(), options)
    }

    fn unary(
        &self,
        method: &MethodInfo,
        input: DynamicMessage,
        options: CallOptions,
    ) -> Result<UnaryCall, RpcError> {
        self.record(method, vec![input.clone()], &options);
        let (call, responder) = UnaryCall::new(method.clone(), options.meta.clone(), input);
        tokio::spawn(Self::settle_unary(
            self.response.clone(),
            self.delay,
            responder,
        ));
        Ok(call)
    }

    fn server_streaming(
        &self,
        method: &MethodInfo,
        input: DynamicMessage,
        options: CallOptions,
    ) -> Result<ServerStreamingCall, RpcError> {
        self.record(method, vec![input.clone()], &options);
        let (call, responder) =
            ServerStreamingCall::new(method.clone(), options.meta.clone(), input);
        tokio::spawn(Self::settle_streaming(
            self.response.clone(),
            self.delay,
            responder,
        ));
        Ok(call)
    }

    fn client_streaming(
        &self,
        method: &MethodInfo,
        options: CallOptions,
    ) -> Result<ClientStreamingCall, RpcError> {
        let (call, responder) = ClientStreamingCall::new(method.clone(), options.meta.clone());
        let response = self.response.clone();
        let delay = self.delay;
        let sent = self.sent.clone();
        let method_path = method.path();
        let request_meta = options.meta.clone();
        tokio::spawn(async move {
            // Drain the caller's requests before answering.
            let mut requests = responder.requests;
            let mut received = Vec::new();
            while let Some(message) = requests.next().await {
                received.push(message);
            }
            sent.lock().unwrap().push(SentCall {
                method_path,
                requests: received,
                request_meta,
            });

            let unary = UnaryResponder {
                headers: responder.headers,
                response: responder.response,
                status: responder.status,
                trailers: responder.trailers,
            };
            Self::settle_unary(response, delay, unary).await;
        });
        Ok(call)
    }

    fn duplex(
        &self,
        method: &MethodInfo,
        options: CallOptions,
    ) -> Result<DuplexStreamingCall, RpcError> {
        let (call, responder) = DuplexStreamingCall::new(method.clone(), options.meta.clone());
        let response = self.response.clone();
        let delay = self.delay;
        let sent = self.sent.clone();
        let method_path = method.path();
        let request_meta = options.meta.clone();
        tokio::spawn(async move {
            let mut requests = responder.requests;
            let mut received = Vec::new();
            while let Some(message) = requests.next().await {
                received.push(message);
            }
            sent.lock().unwrap().push(SentCall {
                method_path,
                requests: received,
                request_meta,
            });

            let streaming = ServerStreamingResponder {
                headers: responder.headers,
                responses: responder.responses,
                status: responder.status,
                trailers: responder.trailers,
            };
            Self::settle_streaming(response, delay, streaming).await;
        });
        Ok(call)
    }
}
