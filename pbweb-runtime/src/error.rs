//! Codec error types.
//!
//! Decode and encode failures are fatal to the single operation that raised
//! them and are never retried by the codec itself.

/// Errors raised while decoding binary wire data.
///
/// Every variant describes malformed input or a schema violation; none of
/// them are recoverable within the same decode pass.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before the value was complete.
    #[error("premature end of input at offset {0}")]
    PrematureEof(usize),

    /// A varint ran past 10 bytes / 64 bits.
    #[error("varint exceeds 64 bits at offset {0}")]
    VarintOverflow(usize),

    /// A tag carried field number 0, which the wire format reserves.
    #[error("invalid tag: field number must not be 0")]
    ZeroFieldNumber,

    /// The low 3 bits of a tag held 6 or 7, which name no wire type.
    #[error("invalid wire type {0}")]
    InvalidWireType(u8),

    /// An end-group tag appeared without a matching start group, or with the
    /// wrong field number.
    #[error("unexpected end group tag")]
    UnexpectedEndGroup,

    /// A string field held bytes that are not valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// An unknown field was met while the read policy is
    /// [`UnknownFieldPolicy::Deny`](crate::UnknownFieldPolicy::Deny).
    #[error("unknown field {field_no} (wire type {wire_type}) for {type_name}")]
    UnknownField {
        type_name: String,
        field_no: u32,
        wire_type: u8,
    },

    /// A map entry contained a sub-field other than key (1) or value (2).
    #[error("unknown map entry field {field_no} for {type_name}")]
    UnknownMapEntryField { type_name: String, field_no: u32 },

    /// A 64-bit field with the safe-number representation decoded a value
    /// outside ±(2^53 − 1).
    #[error("{value} exceeds the safe number range of field {field}")]
    UnsafeLong { field: String, value: String },

    /// The schema registry has no entry for a referenced type name.
    #[error("unknown type {0}")]
    UnknownType(String),
}

/// Errors raised while encoding a message to binary wire data.
///
/// Encoding only fails when a stored value contradicts the schema, or when a
/// referenced type is missing from the registry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A field holds a [`Value`](crate::Value) variant that does not match
    /// its declared kind.
    #[error("field {field} of {type_name} holds a {found} value, expected {expected}")]
    ValueKind {
        type_name: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A 64-bit field with the safe-number representation holds a value
    /// outside ±(2^53 − 1).
    #[error("{value} exceeds the safe number range of field {field}")]
    UnsafeLong { field: String, value: String },

    /// A text-representation 64-bit field holds a string that is not a
    /// decimal integer.
    #[error("field {field} holds a non-numeric text value")]
    MalformedLongText { field: String },

    /// The schema registry has no entry for a referenced type name.
    #[error("unknown type {0}")]
    UnknownType(String),
}
