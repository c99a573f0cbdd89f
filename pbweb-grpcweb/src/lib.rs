//! gRPC-Web client transport for the pbweb RPC runtime.
//!
//! Implements the protocol a browser-facing gRPC proxy speaks: length-
//! prefixed frames over a single HTTP POST, with the call status carried
//! either in the response headers or in a trailer frame at the end of the
//! body. Both the binary (`application/grpc-web+proto`) and base64 text
//! (`application/grpc-web-text+proto`) encodings are supported; responses
//! follow whatever content type the server declares.
//!
//! [`GrpcWebTransport`] plugs into `pbweb_rpc::ServiceClient` as an
//! [`RpcTransport`](pbweb_rpc::RpcTransport). The protocol cannot stream
//! request bodies, so only unary and server-streaming calls are available.
//! The wire-level pieces live in [`format`] and can be used on their own,
//! for example to parse captured traffic.

pub mod format;
pub mod http;
pub mod transport;

pub use format::{
    Frame, FrameDecoder, GrpcWebFormat, http_status_to_grpc, parse_format, parse_metadata,
    parse_status, read_response_header, read_response_trailer, write_request_body,
    write_request_headers,
};
pub use http::{build_https_connector, default_tls_config};
pub use transport::{GrpcWebTransport, GrpcWebTransportBuilder};
