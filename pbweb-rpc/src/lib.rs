//! Transport-agnostic RPC call runtime.
//!
//! This crate binds the reflection codec of `pbweb-runtime` to concrete
//! wire transports: the four call shapes with their asynchronous facets,
//! the interceptor stack, call options with merging, and the
//! [`RpcTransport`] trait a wire binding implements.
//!
//! The runtime guarantees that every call settles its status facet exactly
//! once, that streamed responses arrive in wire order, and that status and
//! trailers settle strictly after the last streamed value. RPC-level
//! failures are delivered through facets as [`RpcError`]; the only
//! synchronous errors are setup problems detected before I/O.
//!
//! [`TestTransport`] answers calls from canned responses and records what
//! was sent, so the runtime (and application interceptors) can be tested
//! without a network.

pub mod call;
pub mod cancel;
pub mod client;
pub mod deferred;
pub mod error;
pub mod interceptor;
pub mod metadata;
pub mod options;
pub mod output_stream;
pub mod sink;
pub mod status;
pub mod test_transport;
pub mod transport;

pub use call::{
    ClientStreamingCall, ClientStreamingResponder, DuplexStreamingCall, DuplexStreamingResponder,
    FinishedClientStreamingCall, FinishedDuplexStreamingCall, FinishedServerStreamingCall,
    FinishedUnaryCall, ServerStreamingCall, ServerStreamingResponder, UnaryCall, UnaryResponder,
};
pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use client::ServiceClient;
pub use deferred::{Deferred, DeferredSettler, DeferredState, deferred};
pub use error::RpcError;
pub use interceptor::{
    ClientStreamingFn, DuplexFn, Interceptor, MetaInterceptor, ServerStreamingFn, UnaryFn,
};
pub use metadata::{Metadata, MetadataValue, is_binary_key};
pub use options::{CallOptions, Timeout};
pub use output_stream::{RpcOutputStream, RpcOutputStreamController, output_stream};
pub use sink::{RequestReceiver, RequestSink, request_sink};
pub use status::{Code, RpcStatus};
pub use test_transport::{CannedResponse, SentCall, TestTransport};
pub use transport::{MethodInfo, RpcTransport, ServiceInfo};
