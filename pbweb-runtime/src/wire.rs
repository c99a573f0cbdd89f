//! Wire-format primitives: tags, varints and zigzag.
//!
//! These are the leaf encode/decode routines every higher layer builds on.
//! They operate on plain byte slices with an explicit position so the
//! [`BinaryReader`](crate::BinaryReader) and
//! [`BinaryWriter`](crate::BinaryWriter) cursors stay thin.

use crate::error::DecodeError;

/// Protobuf wire types, the low 3 bits of every field tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// int32, int64, uint32, uint64, sint32, sint64, bool, enum.
    Varint = 0,
    /// fixed64, sfixed64, double. Always 8 bytes.
    Bit64 = 1,
    /// string, bytes, embedded messages, packed repeated fields.
    LengthDelimited = 2,
    /// Deprecated group start. Supported for skipping only.
    StartGroup = 3,
    /// Deprecated group end. Supported for skipping only.
    EndGroup = 4,
    /// fixed32, sfixed32, float. Always 4 bytes.
    Bit32 = 5,
}

impl WireType {
    /// Interpret the low 3 bits of a tag.
    pub fn from_tag_bits(bits: u8) -> Result<WireType, DecodeError> {
        match bits & 0x7 {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Bit64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Bit32),
            other => Err(DecodeError::InvalidWireType(other)),
        }
    }
}

/// Build a field tag: `(field_no << 3) | wire_type`.
pub fn make_tag(field_no: u32, wire_type: WireType) -> u32 {
    (field_no << 3) | wire_type as u32
}

/// Split a tag into field number and wire type.
///
/// A field number of 0 is reserved by the wire format and rejected here.
pub fn split_tag(tag: u32) -> Result<(u32, WireType), DecodeError> {
    let field_no = tag >> 3;
    if field_no == 0 {
        return Err(DecodeError::ZeroFieldNumber);
    }
    let wire_type = WireType::from_tag_bits((tag & 0x7) as u8)?;
    Ok((field_no, wire_type))
}

/// Append a base-128 varint to `buf`.
pub fn write_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read a base-128 varint from `buf` starting at `*pos`, advancing `*pos`.
pub fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        if *pos >= buf.len() {
            return Err(DecodeError::PrematureEof(*pos));
        }
        if shift >= 64 {
            return Err(DecodeError::VarintOverflow(*pos));
        }
        let byte = buf[*pos];
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Zigzag-encode a signed 32-bit integer so small negatives stay short.
pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Invert [`zigzag_encode32`].
pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Zigzag-encode a signed 64-bit integer.
pub fn zigzag_encode64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Invert [`zigzag_encode64`].
pub fn zigzag_decode64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_single_byte() {
        let mut buf = Vec::new();
        write_varint(0, &mut buf);
        assert_eq!(buf, [0x00]);
        buf.clear();
        write_varint(127, &mut buf);
        assert_eq!(buf, [0x7f]);
    }

    #[test]
    fn varint_multi_byte() {
        let mut buf = Vec::new();
        write_varint(300, &mut buf);
        assert_eq!(buf, [0xac, 0x02]);

        let mut pos = 0;
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), 300);
        assert_eq!(pos, 2);
    }

    #[test]
    fn varint_max_u64() {
        let mut buf = Vec::new();
        write_varint(u64::MAX, &mut buf);
        assert_eq!(buf.len(), 10);

        let mut pos = 0;
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), u64::MAX);
    }

    #[test]
    fn varint_truncated() {
        // continuation bit set but no next byte
        let mut pos = 0;
        let err = read_varint(&[0x80], &mut pos).unwrap_err();
        assert_eq!(err, DecodeError::PrematureEof(1));
    }

    #[test]
    fn varint_overflow() {
        // 11 bytes of continuation
        let buf = [0xff; 11];
        let mut pos = 0;
        assert!(matches!(
            read_varint(&buf, &mut pos),
            Err(DecodeError::VarintOverflow(_))
        ));
    }

    #[test]
    fn zigzag_roundtrip() {
        for v in [0i32, -1, 1, -2, 2, i32::MIN, i32::MAX] {
            assert_eq!(zigzag_decode32(zigzag_encode32(v)), v);
        }
        for v in [0i64, -1, 1, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode64(zigzag_encode64(v)), v);
        }
        // small negatives are compact
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
    }

    #[test]
    fn tag_roundtrip() {
        let tag = make_tag(1, WireType::LengthDelimited);
        assert_eq!(tag, 0x0a);
        assert_eq!(split_tag(tag).unwrap(), (1, WireType::LengthDelimited));
    }

    #[test]
    fn tag_field_number_zero_rejected() {
        assert_eq!(split_tag(0x02), Err(DecodeError::ZeroFieldNumber));
    }

    #[test]
    fn tag_invalid_wire_type_rejected() {
        assert_eq!(split_tag(0x0f), Err(DecodeError::InvalidWireType(7)));
    }
}
