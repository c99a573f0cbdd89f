//! Interceptors: composable middleware around the transport invocation.
//!
//! An interceptor maps a "next" invocation function to a replacement with
//! the same signature: it may rewrite the method, input or options before
//! delegating inward, observe the returned call, or short-circuit without
//! delegating at all. The four call shapes have different signatures, so
//! each folds independently.
//!
//! [`stack_unary`] and friends perform the fold: the first-registered
//! interceptor is outermost and sees the call first; the transport's own
//! send function is innermost.

use std::sync::Arc;

use pbweb_runtime::DynamicMessage;

use crate::call::{ClientStreamingCall, DuplexStreamingCall, ServerStreamingCall, UnaryCall};
use crate::error::RpcError;
use crate::options::CallOptions;
use crate::transport::{MethodInfo, RpcTransport};

/// The invocation signature of a unary call.
pub type UnaryFn = Arc<
    dyn Fn(MethodInfo, DynamicMessage, CallOptions) -> Result<UnaryCall, RpcError> + Send + Sync,
>;

/// The invocation signature of a server-streaming call.
pub type ServerStreamingFn = Arc<
    dyn Fn(MethodInfo, DynamicMessage, CallOptions) -> Result<ServerStreamingCall, RpcError>
        + Send
        + Sync,
>;

/// The invocation signature of a client-streaming call.
pub type ClientStreamingFn =
    Arc<dyn Fn(MethodInfo, CallOptions) -> Result<ClientStreamingCall, RpcError> + Send + Sync>;

/// The invocation signature of a duplex call.
pub type DuplexFn =
    Arc<dyn Fn(MethodInfo, CallOptions) -> Result<DuplexStreamingCall, RpcError> + Send + Sync>;

/// Middleware wrapping RPC invocations.
///
/// Every method defaults to passing `next` through unchanged, so an
/// implementation only overrides the shapes it cares about.
pub trait Interceptor: Send + Sync {
    fn wrap_unary(&self, next: UnaryFn) -> UnaryFn {
        next
    }

    fn wrap_server_streaming(&self, next: ServerStreamingFn) -> ServerStreamingFn {
        next
    }

    fn wrap_client_streaming(&self, next: ClientStreamingFn) -> ClientStreamingFn {
        next
    }

    fn wrap_duplex(&self, next: DuplexFn) -> DuplexFn {
        next
    }
}

/// Invoke a unary call through the interceptor stack in `options`.
pub fn stack_unary(
    transport: &Arc<dyn RpcTransport>,
    method: MethodInfo,
    input: DynamicMessage,
    options: CallOptions,
) -> Result<UnaryCall, RpcError> {
    let tail = transport.clone();
    let mut next: UnaryFn = Arc::new(move |m, i, o| tail.unary(&m, i, o));
    // Wrap in reverse registration order so the first interceptor is
    // outermost.
    for interceptor in options.interceptors.iter().rev() {
        next = interceptor.wrap_unary(next);
    }
    next(method, input, options)
}

/// Invoke a server-streaming call through the interceptor stack.
pub fn stack_server_streaming(
    transport: &Arc<dyn RpcTransport>,
    method: MethodInfo,
    input: DynamicMessage,
    options: CallOptions,
) -> Result<ServerStreamingCall, RpcError> {
    let tail = transport.clone();
    let mut next: ServerStreamingFn = Arc::new(move |m, i, o| tail.server_streaming(&m, i, o));
    for interceptor in options.interceptors.iter().rev() {
        next = interceptor.wrap_server_streaming(next);
    }
    next(method, input, options)
}

/// Invoke a client-streaming call through the interceptor stack.
pub fn stack_client_streaming(
    transport: &Arc<dyn RpcTransport>,
    method: MethodInfo,
    options: CallOptions,
) -> Result<ClientStreamingCall, RpcError> {
    let tail = transport.clone();
    let mut next: ClientStreamingFn = Arc::new(move |m, o| tail.client_streaming(&m, o));
    for interceptor in options.interceptors.iter().rev() {
        next = interceptor.wrap_client_streaming(next);
    }
    next(method, options)
}

/// Invoke a duplex call through the interceptor stack.
pub fn stack_duplex(
    transport: &Arc<dyn RpcTransport>,
    method: MethodInfo,
    options: CallOptions,
) -> Result<DuplexStreamingCall, RpcError> {
    let tail = transport.clone();
    let mut next: DuplexFn = Arc::new(move |m, o| tail.duplex(&m, o));
    for interceptor in options.interceptors.iter().rev() {
        next = interceptor.wrap_duplex(next);
    }
    next(method, options)
}

/// An interceptor that adds one metadata entry to every request.
pub struct MetaInterceptor {
    key: String,
    value: String,
}

impl MetaInterceptor {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_owned(),
            value: value.to_owned(),
        }
    }
}

impl Interceptor for MetaInterceptor {
    fn wrap_unary(&self, next: UnaryFn) -> UnaryFn {
        let key = self.key.clone();
        let value = self.value.clone();
        Arc::new(move |method, input, mut options| {
            options.meta.set(key.clone(), value.clone());
            next(method, input, options)
        })
    }

    fn wrap_server_streaming(&self, next: ServerStreamingFn) -> ServerStreamingFn {
        let key = self.key.clone();
        let value = self.value.clone();
        Arc::new(move |method, input, mut options| {
            options.meta.set(key.clone(), value.clone());
            next(method, input, options)
        })
    }

    fn wrap_client_streaming(&self, next: ClientStreamingFn) -> ClientStreamingFn {
        let key = self.key.clone();
        let value = self.value.clone();
        Arc::new(move |method, mut options| {
            options.meta.set(key.clone(), value.clone());
            next(method, options)
        })
    }

    fn wrap_duplex(&self, next: DuplexFn) -> DuplexFn {
        let key = self.key.clone();
        let value = self.value.clone();
        Arc::new(move |method, mut options| {
            options.meta.set(key.clone(), value.clone());
            next(method, options)
        })
    }
}
