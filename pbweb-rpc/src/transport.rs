//! The transport abstraction and service/method descriptors.

use crate::call::{ClientStreamingCall, DuplexStreamingCall, ServerStreamingCall, UnaryCall};
use crate::error::RpcError;
use crate::options::CallOptions;

/// Description of one RPC method, as supplied by the schema provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    /// Fully-qualified type name of the owning service.
    pub service: String,
    /// Method name as declared, e.g. `GetOrder`.
    pub name: String,
    /// Method name in the host language convention, e.g. `get_order`.
    pub local_name: String,
    /// Whether the method is declared side-effect free.
    pub idempotent: bool,
    pub client_streaming: bool,
    pub server_streaming: bool,
    /// Type name of the input message, resolved through the registry.
    pub input_type: String,
    /// Type name of the output message, resolved through the registry.
    pub output_type: String,
}

impl MethodInfo {
    pub fn new(
        service: &str,
        name: &str,
        local_name: &str,
        input_type: &str,
        output_type: &str,
    ) -> Self {
        Self {
            service: service.to_owned(),
            name: name.to_owned(),
            local_name: local_name.to_owned(),
            idempotent: false,
            client_streaming: false,
            server_streaming: false,
            input_type: input_type.to_owned(),
            output_type: output_type.to_owned(),
        }
    }

    pub fn client_streaming(mut self) -> Self {
        self.client_streaming = true;
        self
    }

    pub fn server_streaming(mut self) -> Self {
        self.server_streaming = true;
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// The request path of this method: `service/Name`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.service, self.name)
    }
}

/// Description of one service: its type name and methods.
#[derive(Clone, Debug)]
pub struct ServiceInfo {
    type_name: String,
    methods: Vec<MethodInfo>,
}

impl ServiceInfo {
    pub fn new(type_name: &str, methods: Vec<MethodInfo>) -> Self {
        Self {
            type_name: type_name.to_owned(),
            methods,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    /// Look up a method by its local name.
    pub fn method(&self, local_name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.local_name == local_name)
    }
}

/// A concrete wire binding for RPC calls.
///
/// Methods are synchronous: they return a call whose facets settle as the
/// transport makes progress on a background task. An `Err` return is
/// reserved for setup failures detected before any I/O; everything that
/// happens on the wire settles facets instead.
pub trait RpcTransport: Send + Sync {
    /// Fold this transport's default options under per-call options.
    fn merge_options(&self, options: CallOptions) -> CallOptions {
        options
    }

    fn unary(
        &self,
        method: &MethodInfo,
        input: pbweb_runtime::DynamicMessage,
        options: CallOptions,
    ) -> Result<UnaryCall, RpcError>;

    fn server_streaming(
        &self,
        method: &MethodInfo,
        input: pbweb_runtime::DynamicMessage,
        options: CallOptions,
    ) -> Result<ServerStreamingCall, RpcError>;

    fn client_streaming(
        &self,
        method: &MethodInfo,
        options: CallOptions,
    ) -> Result<ClientStreamingCall, RpcError>;

    fn duplex(
        &self,
        method: &MethodInfo,
        options: CallOptions,
    ) -> Result<DuplexStreamingCall, RpcError>;
}
