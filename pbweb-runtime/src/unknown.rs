//! Unknown field handling.

use bytes::Bytes;

use crate::wire::WireType;

/// A field the decoder found no schema entry for, preserved verbatim.
///
/// `data` holds the field payload without the tag: the raw varint bytes,
/// the 4 or 8 fixed bytes, or length prefix plus content for
/// length-delimited fields. Re-encoding writes the original tag followed by
/// `data`, which reproduces the input bytes exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownField {
    pub field_no: u32,
    pub wire_type: WireType,
    pub data: Bytes,
}

/// What the decoder does with fields that are missing from the schema.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownFieldPolicy {
    /// Preserve the field on the message for re-encoding.
    #[default]
    Keep,
    /// Skip the field and drop its bytes.
    Discard,
    /// Fail decoding with [`DecodeError::UnknownField`](crate::DecodeError::UnknownField).
    Deny,
}
