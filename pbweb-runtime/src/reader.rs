//! Binary read cursor.
//!
//! [`BinaryReader`] owns a position into a borrowed byte buffer and offers
//! one typed read per protobuf scalar, plus [`tag`](BinaryReader::tag) and
//! [`skip`](BinaryReader::skip). All reads are bounds-checked and fail with
//! [`DecodeError::PrematureEof`] rather than panicking.

use crate::error::DecodeError;
use crate::wire::{self, WireType};

/// A cursor over a byte buffer holding protobuf wire data.
///
/// # Example
///
/// ```
/// use pbweb_runtime::{BinaryReader, WireType};
///
/// // field 1 (varint) = 150
/// let mut reader = BinaryReader::new(&[0x08, 0x96, 0x01]);
/// let (field_no, wire_type) = reader.tag().unwrap();
/// assert_eq!((field_no, wire_type), (1, WireType::Varint));
/// assert_eq!(reader.int32().unwrap(), 150);
/// ```
#[derive(Debug)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current read position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Total buffer length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::PrematureEof(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        wire::read_varint(self.buf, &mut self.pos)
    }

    /// Read a field tag, split into field number and wire type.
    pub fn tag(&mut self) -> Result<(u32, WireType), DecodeError> {
        let raw = self.varint()?;
        let raw = u32::try_from(raw).map_err(|_| DecodeError::VarintOverflow(self.pos))?;
        wire::split_tag(raw)
    }

    /// Skip one value of the given wire type, returning the raw bytes that
    /// were skipped so callers can preserve them verbatim.
    ///
    /// Groups are skipped recursively; the end-group tag must carry
    /// `field_no`.
    pub fn skip(&mut self, wire_type: WireType, field_no: u32) -> Result<&'a [u8], DecodeError> {
        let start = self.pos;
        match wire_type {
            WireType::Varint => {
                self.varint()?;
            }
            WireType::Bit64 => {
                self.take(8)?;
            }
            WireType::Bit32 => {
                self.take(4)?;
            }
            WireType::LengthDelimited => {
                let len = self.uint32()? as usize;
                self.take(len)?;
            }
            WireType::StartGroup => loop {
                let (no, wt) = self.tag()?;
                if wt == WireType::EndGroup {
                    if no != field_no {
                        return Err(DecodeError::UnexpectedEndGroup);
                    }
                    break;
                }
                self.skip(wt, no)?;
            },
            WireType::EndGroup => return Err(DecodeError::UnexpectedEndGroup),
        }
        Ok(&self.buf[start..self.pos])
    }

    /// Read `uint32`. Values on the wire may occupy up to 10 bytes; the low
    /// 32 bits are kept, matching the reference implementations.
    pub fn uint32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.varint()? as u32)
    }

    /// Read `int32` (sign carried in 64-bit two's complement on the wire).
    pub fn int32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.varint()? as i32)
    }

    /// Read `sint32` (zigzag).
    pub fn sint32(&mut self) -> Result<i32, DecodeError> {
        Ok(wire::zigzag_decode32(self.varint()? as u32))
    }

    /// Read `uint64`.
    pub fn uint64(&mut self) -> Result<u64, DecodeError> {
        self.varint()
    }

    /// Read `int64`.
    pub fn int64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.varint()? as i64)
    }

    /// Read `sint64` (zigzag).
    pub fn sint64(&mut self) -> Result<i64, DecodeError> {
        Ok(wire::zigzag_decode64(self.varint()?))
    }

    /// Read `bool`.
    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.varint()? != 0)
    }

    /// Read `fixed32` (little-endian).
    pub fn fixed32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read `sfixed32` (little-endian).
    pub fn sfixed32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.fixed32()? as i32)
    }

    /// Read `float` (little-endian).
    pub fn float(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.fixed32()?))
    }

    /// Read `fixed64` (little-endian).
    pub fn fixed64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read `sfixed64` (little-endian).
    pub fn sfixed64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.fixed64()? as i64)
    }

    /// Read `double` (little-endian).
    pub fn double(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.fixed64()?))
    }

    /// Read length-delimited bytes, borrowed from the underlying buffer.
    pub fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.uint32()? as usize;
        self.take(len)
    }

    /// Read a length-delimited UTF-8 string.
    pub fn string(&mut self) -> Result<&'a str, DecodeError> {
        let bytes = self.bytes()?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_negative_int32_from_ten_byte_varint() {
        // -1 as int32 is sign-extended to 64 bits on the wire
        let buf = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut reader = BinaryReader::new(&buf);
        assert_eq!(reader.int32().unwrap(), -1);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn reads_fixed_sizes_little_endian() {
        let buf = [
            0x01, 0x00, 0x00, 0x00, // fixed32 = 1
            0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // fixed64 = 2
        ];
        let mut reader = BinaryReader::new(&buf);
        assert_eq!(reader.fixed32().unwrap(), 1);
        assert_eq!(reader.fixed64().unwrap(), 2);
    }

    #[test]
    fn reads_string_and_rejects_bad_utf8() {
        let buf = [0x02, b'h', b'i'];
        let mut reader = BinaryReader::new(&buf);
        assert_eq!(reader.string().unwrap(), "hi");

        let bad = [0x01, 0xff];
        let mut reader = BinaryReader::new(&bad);
        assert_eq!(reader.string().unwrap_err(), DecodeError::InvalidUtf8);
    }

    #[test]
    fn bytes_out_of_bounds() {
        // declared length 5, only 2 bytes present
        let buf = [0x05, 0x01, 0x02];
        let mut reader = BinaryReader::new(&buf);
        assert!(matches!(
            reader.bytes(),
            Err(DecodeError::PrematureEof(_))
        ));
    }

    #[test]
    fn skip_returns_raw_bytes() {
        // field 2, varint 300, then field 3, 2 bytes "ab"
        let buf = [0x10, 0xac, 0x02, 0x1a, 0x02, b'a', b'b'];
        let mut reader = BinaryReader::new(&buf);

        let (no, wt) = reader.tag().unwrap();
        assert_eq!((no, wt), (2, WireType::Varint));
        assert_eq!(reader.skip(wt, no).unwrap(), &[0xac, 0x02]);

        let (no, wt) = reader.tag().unwrap();
        assert_eq!((no, wt), (3, WireType::LengthDelimited));
        assert_eq!(reader.skip(wt, no).unwrap(), &[0x02, b'a', b'b']);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn skip_group_consumes_until_end() {
        // start group field 4 containing field 1 varint 1, then end group 4
        let buf = [0x23, 0x08, 0x01, 0x24];
        let mut reader = BinaryReader::new(&buf);
        let (no, wt) = reader.tag().unwrap();
        assert_eq!((no, wt), (4, WireType::StartGroup));
        let skipped = reader.skip(wt, no).unwrap();
        assert_eq!(skipped, &[0x08, 0x01, 0x24]);
    }

    #[test]
    fn skip_group_wrong_end_field() {
        // start group field 4, end group field 5
        let buf = [0x23, 0x2c];
        let mut reader = BinaryReader::new(&buf);
        let (no, wt) = reader.tag().unwrap();
        assert_eq!(
            reader.skip(wt, no).unwrap_err(),
            DecodeError::UnexpectedEndGroup
        );
    }
}
