//! The gRPC-Web client transport.
//!
//! [`GrpcWebTransport`] implements [`RpcTransport`] over a hyper client:
//! each call builds one HTTP POST, spawns a task that drives the exchange,
//! and settles the call's facets in protocol order (headers, messages,
//! status, trailers). All I/O failures are delivered through facets; the
//! synchronous `Err` path is reserved for setup problems found before any
//! network traffic.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http::{Method, Request, Uri};
use http_body_util::{BodyDataStream, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use pbweb_runtime::{DecodeOptions, DynamicMessage, TypeRegistry, decode, encode};
use pbweb_rpc::{
    CallOptions, CancelSignal, ClientStreamingCall, Code, DuplexStreamingCall, Metadata,
    MethodInfo, RpcError, RpcStatus, RpcTransport, ServerStreamingCall, ServerStreamingResponder,
    Timeout, UnaryCall, UnaryResponder,
};
use rustls::ClientConfig;

use crate::format::{self, Frame, FrameDecoder, GrpcWebFormat};
use crate::http::build_https_connector;

type GrpcWebClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// A gRPC-Web transport over a pooled hyper client.
///
/// Supports unary and server-streaming calls; the protocol cannot stream
/// request bodies, so client- and duplex-streaming fail with
/// `UNIMPLEMENTED`.
///
/// # Example
///
/// ```ignore
/// let transport = GrpcWebTransport::builder("https://api.example.com")
///     .format(GrpcWebFormat::Text)
///     .registry(registry)
///     .build()?;
/// let client = ServiceClient::new(service_info, Arc::new(transport));
/// ```
pub struct GrpcWebTransport {
    client: GrpcWebClient,
    base_uri: String,
    format: GrpcWebFormat,
    registry: Arc<TypeRegistry>,
    user_agent: Option<String>,
    defaults: CallOptions,
}

impl std::fmt::Debug for GrpcWebTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcWebTransport")
            .field("base_uri", &self.base_uri)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl GrpcWebTransport {
    /// Create a transport builder for the given base URI.
    pub fn builder(base_uri: impl Into<String>) -> GrpcWebTransportBuilder {
        GrpcWebTransportBuilder::new(base_uri)
    }

    /// Validate the deadline and metadata, encode the request message, and
    /// build the HTTP request. Everything here fails synchronously.
    fn prepare(
        &self,
        method: &MethodInfo,
        input: &DynamicMessage,
        options: &CallOptions,
    ) -> Result<Request<Full<Bytes>>, RpcError> {
        let headers = format::write_request_headers(
            &options.meta,
            self.format,
            options.timeout,
            self.user_agent.as_deref(),
        )?;
        let payload = encode(&self.registry, input, options.encode_options())?;
        let body = format::write_request_body(&payload, self.format);
        let uri: Uri = format!("{}/{}", self.base_uri, method.path())
            .parse()
            .map_err(|_| {
                RpcError::invalid_argument(format!("invalid request uri for {}", method.path()))
            })?;

        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Full::new(body))
            .map_err(|err| RpcError::internal(format!("failed to build request: {err}")))?;
        *request.headers_mut() = headers;
        Ok(request)
    }

    fn context(&self, method: &MethodInfo, options: &CallOptions) -> CallContext {
        CallContext {
            client: self.client.clone(),
            registry: self.registry.clone(),
            output_type: method.output_type.clone(),
            decode: options.decode_options(),
        }
    }
}

impl RpcTransport for GrpcWebTransport {
    fn merge_options(&self, options: CallOptions) -> CallOptions {
        CallOptions::merge(self.defaults.clone(), options)
    }

    fn unary(
        &self,
        method: &MethodInfo,
        input: DynamicMessage,
        options: CallOptions,
    ) -> Result<UnaryCall, RpcError> {
        let request = self.prepare(method, &input, &options)?;
        let ctx = self.context(method, &options);
        let guard = Guard::new(&options);
        #[cfg(feature = "tracing")]
        tracing::debug!(method = %method.path(), "starting unary call");
        let (call, responder) = UnaryCall::new(method.clone(), options.meta.clone(), input);
        tokio::spawn(async move {
            let result = guard.run(ctx.run_unary(request, &responder)).await;
            if let Err(err) = result {
                #[cfg(feature = "tracing")]
                tracing::debug!(code = %err.code(), message = %err.message(), "unary call failed");
                responder.fail(err);
            }
        });
        Ok(call)
    }

    fn server_streaming(
        &self,
        method: &MethodInfo,
        input: DynamicMessage,
        options: CallOptions,
    ) -> Result<ServerStreamingCall, RpcError> {
        let request = self.prepare(method, &input, &options)?;
        let ctx = self.context(method, &options);
        let guard = Guard::new(&options);
        #[cfg(feature = "tracing")]
        tracing::debug!(method = %method.path(), "starting server-streaming call");
        let (call, mut responder) =
            ServerStreamingCall::new(method.clone(), options.meta.clone(), input);
        tokio::spawn(async move {
            let result = guard
                .run(ctx.run_server_streaming(request, &mut responder))
                .await;
            if let Err(err) = result {
                #[cfg(feature = "tracing")]
                tracing::debug!(code = %err.code(), message = %err.message(), "server-streaming call failed");
                responder.fail(err);
            }
        });
        Ok(call)
    }

    fn client_streaming(
        &self,
        _method: &MethodInfo,
        _options: CallOptions,
    ) -> Result<ClientStreamingCall, RpcError> {
        Err(RpcError::unimplemented(
            "client streaming is not supported by grpc-web",
        ))
    }

    fn duplex(
        &self,
        _method: &MethodInfo,
        _options: CallOptions,
    ) -> Result<DuplexStreamingCall, RpcError> {
        Err(RpcError::unimplemented(
            "client streaming is not supported by grpc-web",
        ))
    }
}

/// Cancellation and deadline wrapper around a call task.
struct Guard {
    timeout: Option<Timeout>,
    cancel: Option<CancelSignal>,
}

impl Guard {
    fn new(options: &CallOptions) -> Self {
        Self {
            timeout: options.timeout,
            cancel: options.cancel.clone(),
        }
    }

    /// Drive `work`, failing it when the deadline fires or the caller
    /// cancels. Zero and elapsed deadlines never get here; they were
    /// rejected while building the request headers.
    async fn run<F>(self, work: F) -> Result<(), RpcError>
    where
        F: Future<Output = Result<(), RpcError>>,
    {
        let Guard { timeout, cancel } = self;
        let timed = async move {
            match timeout {
                Some(timeout) => {
                    let left = timeout.remaining().unwrap_or(Duration::ZERO);
                    match tokio::time::timeout(left, work).await {
                        Ok(result) => result,
                        Err(_) => Err(RpcError::deadline_exceeded(format!(
                            "timeout {} ms exceeded",
                            left.as_millis()
                        ))),
                    }
                }
                None => work.await,
            }
        };
        match cancel {
            Some(signal) => {
                tokio::select! {
                    result = timed => result,
                    _ = signal.cancelled() => Err(RpcError::cancelled("call cancelled")),
                }
            }
            None => timed.await,
        }
    }
}

/// Everything a spawned call task needs from the transport.
struct CallContext {
    client: GrpcWebClient,
    registry: Arc<TypeRegistry>,
    output_type: String,
    decode: DecodeOptions,
}

impl CallContext {
    async fn run_unary(
        self,
        request: Request<Full<Bytes>>,
        responder: &UnaryResponder,
    ) -> Result<(), RpcError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| RpcError::unknown(format!("request failed: {err}")))?;
        let (parts, body) = response.into_parts();

        let (code, message, meta) = format::read_response_header(parts.status, &parts.headers);
        if let Some(code) = code {
            if code != Code::Ok {
                return Err(RpcError::new(code, message.unwrap_or_default()).with_meta(meta));
            }
        }
        responder.headers.resolve(meta);

        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let body_format = format::parse_format(content_type)?;
        let chunks = BodyDataStream::new(body)
            .map(|chunk| chunk.map_err(|err| RpcError::unknown(format!("response stream error: {err}"))));
        let mut frames = FrameDecoder::new(chunks, body_format);

        let mut payload: Option<Bytes> = None;
        let mut trailer: Option<Bytes> = None;
        while let Some(frame) = frames.next().await {
            match frame? {
                Frame::Data(data) => {
                    if payload.is_some() {
                        return Err(RpcError::data_loss("more than one response message"));
                    }
                    payload = Some(data);
                }
                Frame::Trailer(data) => trailer = Some(data),
            }
        }

        // No trailer frame means the status arrived with the headers,
        // which we already know carried no error.
        let (status, trailers) = match trailer {
            Some(data) => format::read_response_trailer(&data),
            None => (RpcStatus::ok(), Metadata::new()),
        };
        if !status.is_ok() {
            return Err(RpcError::new(status.code, status.detail).with_meta(trailers));
        }

        let Some(payload) = payload else {
            return Err(RpcError::data_loss("no response message"));
        };
        let message = decode(&self.registry, &self.output_type, &payload, self.decode)?;
        responder.response.resolve(message);
        responder.status.resolve(status);
        responder.trailers.resolve(trailers);
        Ok(())
    }

    async fn run_server_streaming(
        self,
        request: Request<Full<Bytes>>,
        responder: &mut ServerStreamingResponder,
    ) -> Result<(), RpcError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| RpcError::unknown(format!("request failed: {err}")))?;
        let (parts, body) = response.into_parts();

        let (code, message, meta) = format::read_response_header(parts.status, &parts.headers);
        if let Some(code) = code {
            if code != Code::Ok {
                return Err(RpcError::new(code, message.unwrap_or_default()).with_meta(meta));
            }
        }
        responder.headers.resolve(meta);

        let content_type = parts
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let body_format = format::parse_format(content_type)?;
        let chunks = BodyDataStream::new(body)
            .map(|chunk| chunk.map_err(|err| RpcError::unknown(format!("response stream error: {err}"))));
        let mut frames = FrameDecoder::new(chunks, body_format);

        let mut trailer: Option<Bytes> = None;
        while let Some(frame) = frames.next().await {
            match frame? {
                Frame::Data(data) => {
                    let message =
                        decode(&self.registry, &self.output_type, &data, self.decode)?;
                    responder.responses.send(message);
                }
                Frame::Trailer(data) => trailer = Some(data),
            }
        }

        let (status, trailers) = match trailer {
            Some(data) => format::read_response_trailer(&data),
            None => (RpcStatus::ok(), Metadata::new()),
        };
        if !status.is_ok() {
            return Err(RpcError::new(status.code, status.detail).with_meta(trailers));
        }

        responder.responses.complete();
        responder.status.resolve(status);
        responder.trailers.resolve(trailers);
        Ok(())
    }
}

/// Builder for [`GrpcWebTransport`].
pub struct GrpcWebTransportBuilder {
    base_uri: String,
    format: GrpcWebFormat,
    registry: Arc<TypeRegistry>,
    user_agent: Option<String>,
    defaults: CallOptions,
    tls_config: Option<ClientConfig>,
    pool_idle_timeout: Option<Duration>,
}

impl GrpcWebTransportBuilder {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            format: GrpcWebFormat::default(),
            registry: Arc::new(TypeRegistry::new()),
            user_agent: None,
            defaults: CallOptions::default(),
            tls_config: None,
            pool_idle_timeout: Some(Duration::from_secs(90)),
        }
    }

    /// Wire encoding for requests. Responses follow the server's declared
    /// content type regardless.
    pub fn format(mut self, format: GrpcWebFormat) -> Self {
        self.format = format;
        self
    }

    /// Schemas for every message type the transport's methods reference.
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Sent as `X-User-Agent` on every request.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Options folded under every call made through this transport.
    pub fn default_options(mut self, defaults: CallOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Custom TLS configuration (custom roots, mTLS).
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// How long idle pooled connections are kept. Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<GrpcWebTransport, RpcError> {
        let base_uri = self.base_uri.trim_end_matches('/').to_owned();
        base_uri
            .parse::<Uri>()
            .map_err(|_| RpcError::invalid_argument(format!("invalid base uri: {base_uri}")))?;

        let connector = build_https_connector(self.tls_config);
        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_timer(TokioTimer::new());
        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        let client = builder.build(connector);

        Ok(GrpcWebTransport {
            client,
            base_uri,
            format: self.format,
            registry: self.registry,
            user_agent: self.user_agent,
            defaults: self.defaults,
        })
    }
}

impl std::fmt::Debug for GrpcWebTransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcWebTransportBuilder")
            .field("base_uri", &self.base_uri)
            .field("format", &self.format)
            .field("user_agent", &self.user_agent)
            .field("tls_config", &self.tls_config.is_some())
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbweb_runtime::MessageInfo;

    fn method() -> MethodInfo {
        MethodInfo::new(
            "shop.OrderService",
            "GetOrder",
            "get_order",
            "shop.GetOrderRequest",
            "shop.Order",
        )
    }

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::new()
                .with_message(MessageInfo::new("shop.GetOrderRequest", Vec::new()))
                .with_message(MessageInfo::new("shop.Order", Vec::new())),
        )
    }

    fn empty_request() -> DynamicMessage {
        DynamicMessage::zeroed(&MessageInfo::new("shop.GetOrderRequest", Vec::new()))
    }

    #[tokio::test]
    async fn test_builder_rejects_bad_uri() {
        let err = GrpcWebTransport::builder("not a uri").build().unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_client_streaming_is_unimplemented() {
        let transport = GrpcWebTransport::builder("http://localhost:9000")
            .registry(registry())
            .build()
            .unwrap();
        let err = transport
            .client_streaming(&method(), CallOptions::new())
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
        assert_eq!(err.message(), "client streaming is not supported by grpc-web");

        let err = transport.duplex(&method(), CallOptions::new()).unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_synchronously() {
        let transport = GrpcWebTransport::builder("http://localhost:9000")
            .registry(registry())
            .build()
            .unwrap();
        let err = transport
            .unary(
                &method(),
                empty_request(),
                CallOptions::new().with_timeout(Duration::ZERO),
            )
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert_eq!(err.message(), "timeout 0 ms exceeded");
    }

    #[tokio::test]
    async fn test_unknown_method_type_fails_synchronously() {
        // The request type is not in the registry, so encoding fails
        // before any network traffic.
        let transport = GrpcWebTransport::builder("http://localhost:9000")
            .build()
            .unwrap();
        let err = transport
            .unary(&method(), empty_request(), CallOptions::new())
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_connection_failure_settles_all_facets() {
        // Nothing listens on this port; the request fails and every facet
        // rejects with the same error.
        let transport = GrpcWebTransport::builder("http://127.0.0.1:1")
            .registry(registry())
            .build()
            .unwrap();
        let call = transport
            .unary(&method(), empty_request(), CallOptions::new())
            .unwrap();
        let err = call.status.wait().await.unwrap_err();
        assert_eq!(err.code(), Code::Unknown);
        assert_eq!(
            call.response.wait().await.unwrap_err().code(),
            Code::Unknown
        );
        assert_eq!(call.headers.wait().await.unwrap_err().code(), Code::Unknown);
        assert_eq!(
            call.trailers.wait().await.unwrap_err().code(),
            Code::Unknown
        );
    }

    #[tokio::test]
    async fn test_merge_options_folds_transport_defaults() {
        let mut meta = Metadata::new();
        meta.append("x-api-key", "k");
        let transport = GrpcWebTransport::builder("http://localhost:9000")
            .default_options(CallOptions::new().with_meta(meta))
            .build()
            .unwrap();
        let merged = transport.merge_options(CallOptions::new());
        assert_eq!(merged.meta.get_str("x-api-key"), Some("k"));
    }
}
