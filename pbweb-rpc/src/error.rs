//! The error type carried by every failing facet.

use pbweb_runtime::{DecodeError, EncodeError};

use crate::metadata::Metadata;
use crate::status::Code;

/// An RPC-level failure: a status code, a human-readable message, and any
/// metadata the server attached to the failing response.
///
/// All asynchronous failures of a call deliver an `RpcError` through its
/// facets. Synchronous `RpcError` returns are limited to setup problems
/// detected before any I/O (bad deadline, unknown method, invalid metadata).
#[derive(Clone, Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: Code,
    pub message: String,
    pub meta: Metadata,
}

impl RpcError {
    /// Create an error with a code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            meta: Metadata::new(),
        }
    }

    /// Attach response metadata to this error.
    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Convenience wrapper for [`Code::is_retryable`].
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    // Convenience constructors for the codes the runtime itself raises.

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn data_loss(message: impl Into<String>) -> Self {
        Self::new(Code::DataLoss, message)
    }
}

impl From<DecodeError> for RpcError {
    fn from(err: DecodeError) -> Self {
        RpcError::internal(format!("response decode failed: {err}"))
    }
}

impl From<EncodeError> for RpcError {
    fn from(err: EncodeError) -> Self {
        RpcError::internal(format!("request encode failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RpcError::new(Code::NotFound, "no such order");
        assert_eq!(err.to_string(), "NOT_FOUND: no such order");
    }

    #[test]
    fn test_meta_attached() {
        let mut meta = Metadata::new();
        meta.append("x-detail", "42");
        let err = RpcError::internal("boom").with_meta(meta);
        assert_eq!(err.meta.get_str("x-detail"), Some("42"));
    }

    #[test]
    fn test_codec_errors_map_to_internal() {
        let err: RpcError = DecodeError::PrematureEof(3).into();
        assert_eq!(err.code(), Code::Internal);
    }
}
