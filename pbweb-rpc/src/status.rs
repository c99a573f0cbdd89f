//! gRPC status codes and the terminal status of a call.

use std::str::FromStr;

/// gRPC status codes, as defined by the gRPC protocol.
///
/// Code 0 (`Ok`) is the only success value. Every other code describes a
/// failure, whether it originated on the server, was derived from an HTTP
/// status, or was synthesized locally (cancellation, deadline).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Get the wire-format name of this code, as sent in `grpc-status`
    /// trailers of text-based protocols and used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    /// Look up a code by its numeric value.
    ///
    /// Returns `None` for values outside 0..=16, which a caller parsing a
    /// `grpc-status` header must treat as invalid.
    pub fn from_i32(value: i32) -> Option<Code> {
        Some(match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => return None,
        })
    }

    /// Whether this code is `OK`.
    pub fn is_ok(&self) -> bool {
        matches!(self, Code::Ok)
    }

    /// Returns whether this code indicates a transient condition that may
    /// be resolved by retrying.
    ///
    /// The runtime itself never retries; this is a hint for retrying
    /// interceptors.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Code::Unavailable | Code::ResourceExhausted | Code::Aborted
        )
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCodeError(());

impl std::fmt::Display for ParseCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status code")
    }
}

impl std::error::Error for ParseCodeError {}

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Code::Ok),
            "CANCELLED" | "CANCELED" => Ok(Code::Cancelled),
            "UNKNOWN" => Ok(Code::Unknown),
            "INVALID_ARGUMENT" => Ok(Code::InvalidArgument),
            "DEADLINE_EXCEEDED" => Ok(Code::DeadlineExceeded),
            "NOT_FOUND" => Ok(Code::NotFound),
            "ALREADY_EXISTS" => Ok(Code::AlreadyExists),
            "PERMISSION_DENIED" => Ok(Code::PermissionDenied),
            "RESOURCE_EXHAUSTED" => Ok(Code::ResourceExhausted),
            "FAILED_PRECONDITION" => Ok(Code::FailedPrecondition),
            "ABORTED" => Ok(Code::Aborted),
            "OUT_OF_RANGE" => Ok(Code::OutOfRange),
            "UNIMPLEMENTED" => Ok(Code::Unimplemented),
            "INTERNAL" => Ok(Code::Internal),
            "UNAVAILABLE" => Ok(Code::Unavailable),
            "DATA_LOSS" => Ok(Code::DataLoss),
            "UNAUTHENTICATED" => Ok(Code::Unauthenticated),
            _ => Err(ParseCodeError(())),
        }
    }
}

/// The terminal status of a call.
///
/// Delivered through the call's status facet exactly once. `detail` carries
/// the `grpc-message` text, empty when the server sent none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcStatus {
    pub code: Code,
    pub detail: String,
}

impl RpcStatus {
    /// A status with code and detail text.
    pub fn new(code: Code, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    /// An `OK` status with no detail.
    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    /// Whether the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl std::fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.as_str())?;
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_as_str() {
        assert_eq!(Code::Ok.as_str(), "OK");
        assert_eq!(Code::InvalidArgument.as_str(), "INVALID_ARGUMENT");
        assert_eq!(Code::Unauthenticated.as_str(), "UNAUTHENTICATED");
    }

    #[test]
    fn test_code_from_i32() {
        assert_eq!(Code::from_i32(0), Some(Code::Ok));
        assert_eq!(Code::from_i32(5), Some(Code::NotFound));
        assert_eq!(Code::from_i32(16), Some(Code::Unauthenticated));
        assert_eq!(Code::from_i32(17), None);
        assert_eq!(Code::from_i32(-1), None);
    }

    #[test]
    fn test_code_from_str() {
        assert_eq!("NOT_FOUND".parse(), Ok(Code::NotFound));
        assert_eq!("CANCELLED".parse(), Ok(Code::Cancelled));
        // Both spellings are accepted.
        assert_eq!("CANCELED".parse(), Ok(Code::Cancelled));
        assert!("not_found".parse::<Code>().is_err());
    }

    #[test]
    fn test_code_roundtrip() {
        for no in 0..=16 {
            let code = Code::from_i32(no).unwrap();
            assert_eq!(code.as_str().parse(), Ok(code));
            assert_eq!(code as i32, no);
        }
    }

    #[test]
    fn test_code_is_retryable() {
        assert!(Code::Unavailable.is_retryable());
        assert!(Code::ResourceExhausted.is_retryable());
        assert!(Code::Aborted.is_retryable());
        assert!(!Code::Ok.is_retryable());
        assert!(!Code::DeadlineExceeded.is_retryable());
        assert!(!Code::Internal.is_retryable());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RpcStatus::ok().to_string(), "OK");
        assert_eq!(
            RpcStatus::new(Code::NotFound, "no such order").to_string(),
            "NOT_FOUND: no such order"
        );
    }
}
