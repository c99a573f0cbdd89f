//! A generic service client over any transport.

use std::sync::Arc;

use pbweb_runtime::DynamicMessage;

use crate::call::{ClientStreamingCall, DuplexStreamingCall, ServerStreamingCall, UnaryCall};
use crate::error::RpcError;
use crate::interceptor;
use crate::options::CallOptions;
use crate::transport::{MethodInfo, RpcTransport, ServiceInfo};

/// A client for one service: an entry point per call shape, dispatching by
/// the method's local name.
///
/// Generated bindings wrap this with one typed method per RPC; the client
/// itself only needs the [`ServiceInfo`] table. Entry points fail
/// synchronously with `UNIMPLEMENTED` for an unknown method and
/// `INVALID_ARGUMENT` when the method's streaming shape does not match the
/// entry point used.
pub struct ServiceClient {
    info: ServiceInfo,
    transport: Arc<dyn RpcTransport>,
    defaults: CallOptions,
}

impl ServiceClient {
    pub fn new(info: ServiceInfo, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            info,
            transport,
            defaults: CallOptions::default(),
        }
    }

    /// Options folded under every call made through this client.
    pub fn with_defaults(mut self, defaults: CallOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    /// Invoke a unary method.
    pub fn unary(
        &self,
        local_name: &str,
        input: DynamicMessage,
        options: CallOptions,
    ) -> Result<UnaryCall, RpcError> {
        let method = self.resolve(local_name, false, false)?;
        let options = self.fold_options(options);
        interceptor::stack_unary(&self.transport, method, input, options)
    }

    /// Invoke a server-streaming method.
    pub fn server_streaming(
        &self,
        local_name: &str,
        input: DynamicMessage,
        options: CallOptions,
    ) -> Result<ServerStreamingCall, RpcError> {
        let method = self.resolve(local_name, false, true)?;
        let options = self.fold_options(options);
        interceptor::stack_server_streaming(&self.transport, method, input, options)
    }

    /// Invoke a client-streaming method.
    pub fn client_streaming(
        &self,
        local_name: &str,
        options: CallOptions,
    ) -> Result<ClientStreamingCall, RpcError> {
        let method = self.resolve(local_name, true, false)?;
        let options = self.fold_options(options);
        interceptor::stack_client_streaming(&self.transport, method, options)
    }

    /// Invoke a duplex method.
    pub fn duplex(
        &self,
        local_name: &str,
        options: CallOptions,
    ) -> Result<DuplexStreamingCall, RpcError> {
        let method = self.resolve(local_name, true, true)?;
        let options = self.fold_options(options);
        interceptor::stack_duplex(&self.transport, method, options)
    }

    fn resolve(
        &self,
        local_name: &str,
        client_streaming: bool,
        server_streaming: bool,
    ) -> Result<MethodInfo, RpcError> {
        let method = self.info.method(local_name).ok_or_else(|| {
            RpcError::unimplemented(format!(
                "service {} has no method {local_name}",
                self.info.type_name()
            ))
        })?;
        if method.client_streaming != client_streaming
            || method.server_streaming != server_streaming
        {
            return Err(RpcError::invalid_argument(format!(
                "method {} is not a {} call",
                method.path(),
                shape_name(client_streaming, server_streaming),
            )));
        }
        Ok(method.clone())
    }

    fn fold_options(&self, options: CallOptions) -> CallOptions {
        // Transport defaults sit under client defaults, which sit under
        // the per-call overrides.
        self.transport
            .merge_options(CallOptions::merge(self.defaults.clone(), options))
    }
}

fn shape_name(client_streaming: bool, server_streaming: bool) -> &'static str {
    match (client_streaming, server_streaming) {
        (false, false) => "unary",
        (false, true) => "server-streaming",
        (true, false) => "client-streaming",
        (true, true) => "duplex",
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.info.type_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::interceptor::{Interceptor, MetaInterceptor, UnaryFn};
    use crate::status::Code;
    use crate::test_transport::{CannedResponse, TestTransport};
    use pbweb_runtime::MessageInfo;

    fn order_service() -> ServiceInfo {
        ServiceInfo::new(
            "shop.OrderService",
            vec![
                MethodInfo::new(
                    "shop.OrderService",
                    "GetOrder",
                    "get_order",
                    "shop.GetOrderRequest",
                    "shop.Order",
                ),
                MethodInfo::new(
                    "shop.OrderService",
                    "WatchOrders",
                    "watch_orders",
                    "shop.GetOrderRequest",
                    "shop.Order",
                )
                .server_streaming(),
            ],
        )
    }

    fn empty_message(name: &str) -> DynamicMessage {
        DynamicMessage::zeroed(&MessageInfo::new(name, Vec::new()))
    }

    fn ok_transport() -> Arc<TestTransport> {
        Arc::new(TestTransport::new(CannedResponse::ok(vec![empty_message(
            "shop.Order",
        )])))
    }

    #[tokio::test]
    async fn test_unary_round_trip() {
        let transport = ok_transport();
        let client = ServiceClient::new(order_service(), transport.clone());

        let call = client
            .unary(
                "get_order",
                empty_message("shop.GetOrderRequest"),
                CallOptions::new(),
            )
            .unwrap();
        let finished = call.finish().await.unwrap();
        assert!(finished.status.is_ok());
        assert_eq!(
            transport.sent()[0].method_path,
            "shop.OrderService/GetOrder"
        );
    }

    #[tokio::test]
    async fn test_unknown_method_is_unimplemented() {
        let client = ServiceClient::new(order_service(), ok_transport());
        let err = client
            .unary(
                "delete_order",
                empty_message("shop.GetOrderRequest"),
                CallOptions::new(),
            )
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_invalid_argument() {
        let client = ServiceClient::new(order_service(), ok_transport());
        // watch_orders is server-streaming, not unary.
        let err = client
            .unary(
                "watch_orders",
                empty_message("shop.GetOrderRequest"),
                CallOptions::new(),
            )
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err = client
            .client_streaming("get_order", CallOptions::new())
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    /// Interceptor that logs entry on the way in and logs again once the
    /// call object has been produced by the inner layers.
    struct TraceInterceptor {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for TraceInterceptor {
        fn wrap_unary(&self, next: UnaryFn) -> UnaryFn {
            let name = self.name;
            let log = self.log.clone();
            Arc::new(move |method, input, options| {
                log.lock().unwrap().push(format!("{name}-pre"));
                let result = next(method, input, options);
                log.lock().unwrap().push(format!("{name}-post"));
                result
            })
        }
    }

    /// Transport-recording tail: TestTransport already records, so trace
    /// the invocation by wrapping it with one more interceptor that tags
    /// the innermost position.
    struct TailMarker {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for TailMarker {
        fn wrap_unary(&self, next: UnaryFn) -> UnaryFn {
            let log = self.log.clone();
            Arc::new(move |method, input, options| {
                log.lock().unwrap().push("transport".to_owned());
                next(method, input, options)
            })
        }
    }

    #[tokio::test]
    async fn test_interceptor_order_first_registered_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let options = CallOptions::new()
            .with_interceptor(Arc::new(TraceInterceptor {
                name: "A",
                log: log.clone(),
            }))
            .with_interceptor(Arc::new(TraceInterceptor {
                name: "B",
                log: log.clone(),
            }))
            .with_interceptor(Arc::new(TailMarker { log: log.clone() }));

        let client = ServiceClient::new(order_service(), ok_transport());
        let call = client
            .unary("get_order", empty_message("shop.GetOrderRequest"), options)
            .unwrap();
        call.finish().await.unwrap();

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen, ["A-pre", "B-pre", "transport", "B-post", "A-post"]);
    }

    #[tokio::test]
    async fn test_interceptor_rewrites_metadata() {
        let transport = ok_transport();
        let client = ServiceClient::new(order_service(), transport.clone()).with_defaults(
            CallOptions::new()
                .with_interceptor(Arc::new(MetaInterceptor::new("authorization", "Bearer t"))),
        );

        let call = client
            .unary(
                "get_order",
                empty_message("shop.GetOrderRequest"),
                CallOptions::new(),
            )
            .unwrap();
        call.finish().await.unwrap();

        let sent = transport.sent();
        assert_eq!(
            sent[0].request_meta.get_str("authorization"),
            Some("Bearer t")
        );
    }

    #[tokio::test]
    async fn test_transport_failure_reaches_all_facets() {
        let transport = Arc::new(TestTransport::new(CannedResponse::error(RpcError::new(
            Code::Unavailable,
            "backend down",
        ))));
        let client = ServiceClient::new(order_service(), transport);

        let call = client
            .unary(
                "get_order",
                empty_message("shop.GetOrderRequest"),
                CallOptions::new(),
            )
            .unwrap();
        assert_eq!(
            call.status.wait().await.unwrap_err().code(),
            Code::Unavailable
        );
        assert_eq!(
            call.response.wait().await.unwrap_err().code(),
            Code::Unavailable
        );
        assert_eq!(
            call.headers.wait().await.unwrap_err().code(),
            Code::Unavailable
        );
    }
}
