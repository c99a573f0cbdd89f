//! Binary write cursor.
//!
//! [`BinaryWriter`] appends typed values to an output buffer. Nested
//! length-delimited regions (sub-messages, packed fields, map entries) use
//! [`fork`](BinaryWriter::fork) / [`join`](BinaryWriter::join): `fork`
//! redirects writes into a fresh child buffer, `join` prefixes the child's
//! length as a varint and splices it into the parent.

use crate::wire::{self, WireType};

/// An append-only writer for protobuf wire data.
///
/// All write methods return `&mut Self` so tag and value can be chained:
///
/// ```
/// use pbweb_runtime::{BinaryWriter, WireType};
///
/// let mut writer = BinaryWriter::new();
/// writer.tag(1, WireType::Varint).int32(150);
/// assert_eq!(writer.finish(), vec![0x08, 0x96, 0x01]);
/// ```
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
    stack: Vec<Vec<u8>>,
}

impl BinaryWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written to the current (possibly forked) buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the current buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Start a length-delimited region. Subsequent writes go to a child
    /// buffer until [`join`](BinaryWriter::join).
    pub fn fork(&mut self) -> &mut Self {
        self.stack.push(std::mem::take(&mut self.buf));
        self
    }

    /// Close the innermost forked region: writes the child's byte length as
    /// a varint to the parent, followed by the child's bytes.
    ///
    /// # Panics
    ///
    /// Panics if there is no open fork.
    pub fn join(&mut self) -> &mut Self {
        let parent = self.stack.pop().expect("join without matching fork");
        let child = std::mem::replace(&mut self.buf, parent);
        wire::write_varint(child.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(&child);
        self
    }

    /// Return all bytes written.
    ///
    /// # Panics
    ///
    /// Panics if a forked region is still open.
    pub fn finish(self) -> Vec<u8> {
        assert!(self.stack.is_empty(), "finish with an open fork");
        self.buf
    }

    /// Write a field tag.
    pub fn tag(&mut self, field_no: u32, wire_type: WireType) -> &mut Self {
        self.raw_varint(u64::from(wire::make_tag(field_no, wire_type)))
    }

    /// Write raw bytes verbatim (no length prefix). Used to flush preserved
    /// unknown fields.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    fn raw_varint(&mut self, value: u64) -> &mut Self {
        wire::write_varint(value, &mut self.buf);
        self
    }

    /// Write `bool`.
    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.raw_varint(u64::from(value))
    }

    /// Write `uint32`.
    pub fn uint32(&mut self, value: u32) -> &mut Self {
        self.raw_varint(u64::from(value))
    }

    /// Write `int32`. Negative values sign-extend to 64 bits on the wire.
    pub fn int32(&mut self, value: i32) -> &mut Self {
        self.raw_varint(i64::from(value) as u64)
    }

    /// Write `sint32` (zigzag).
    pub fn sint32(&mut self, value: i32) -> &mut Self {
        self.raw_varint(u64::from(wire::zigzag_encode32(value)))
    }

    /// Write `uint64`.
    pub fn uint64(&mut self, value: u64) -> &mut Self {
        self.raw_varint(value)
    }

    /// Write `int64`.
    pub fn int64(&mut self, value: i64) -> &mut Self {
        self.raw_varint(value as u64)
    }

    /// Write `sint64` (zigzag).
    pub fn sint64(&mut self, value: i64) -> &mut Self {
        self.raw_varint(wire::zigzag_encode64(value))
    }

    /// Write `fixed32` (little-endian).
    pub fn fixed32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Write `sfixed32` (little-endian).
    pub fn sfixed32(&mut self, value: i32) -> &mut Self {
        self.fixed32(value as u32)
    }

    /// Write `float` (little-endian).
    pub fn float(&mut self, value: f32) -> &mut Self {
        self.fixed32(value.to_bits())
    }

    /// Write `fixed64` (little-endian).
    pub fn fixed64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Write `sfixed64` (little-endian).
    pub fn sfixed64(&mut self, value: i64) -> &mut Self {
        self.fixed64(value as u64)
    }

    /// Write `double` (little-endian).
    pub fn double(&mut self, value: f64) -> &mut Self {
        self.fixed64(value.to_bits())
    }

    /// Write length-delimited bytes.
    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.raw_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    /// Write a length-delimited UTF-8 string.
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::BinaryReader;

    #[test]
    fn fork_join_backpatches_length() {
        // field 1 { field 1 varint 5 }
        let mut writer = BinaryWriter::new();
        writer.tag(1, WireType::LengthDelimited).fork();
        writer.tag(1, WireType::Varint).int32(5);
        writer.join();
        assert_eq!(writer.finish(), vec![0x0a, 0x02, 0x08, 0x05]);
    }

    #[test]
    fn nested_forks() {
        // outer { inner { varint field } }
        let mut writer = BinaryWriter::new();
        writer.tag(1, WireType::LengthDelimited).fork();
        writer.tag(2, WireType::LengthDelimited).fork();
        writer.tag(3, WireType::Varint).uint32(1);
        writer.join();
        writer.join();
        assert_eq!(
            writer.finish(),
            vec![0x0a, 0x04, 0x12, 0x02, 0x18, 0x01]
        );
    }

    #[test]
    fn negative_int32_occupies_ten_bytes() {
        let mut writer = BinaryWriter::new();
        writer.int32(-1);
        let out = writer.finish();
        assert_eq!(out.len(), 10);

        let mut reader = BinaryReader::new(&out);
        assert_eq!(reader.int32().unwrap(), -1);
    }

    #[test]
    fn scalar_roundtrips_through_reader() {
        let mut writer = BinaryWriter::new();
        writer
            .sint32(-7)
            .sint64(-9_000_000_000)
            .fixed32(42)
            .sfixed64(-42)
            .double(1.5)
            .string("héllo")
            .bool(true);
        let out = writer.finish();

        let mut reader = BinaryReader::new(&out);
        assert_eq!(reader.sint32().unwrap(), -7);
        assert_eq!(reader.sint64().unwrap(), -9_000_000_000);
        assert_eq!(reader.fixed32().unwrap(), 42);
        assert_eq!(reader.sfixed64().unwrap(), -42);
        assert_eq!(reader.double().unwrap(), 1.5);
        assert_eq!(reader.string().unwrap(), "héllo");
        assert!(reader.bool().unwrap());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    #[should_panic(expected = "join without matching fork")]
    fn join_without_fork_panics() {
        let mut writer = BinaryWriter::new();
        writer.join();
    }

    #[test]
    #[should_panic(expected = "finish with an open fork")]
    fn finish_with_open_fork_panics() {
        let mut writer = BinaryWriter::new();
        writer.fork();
        let _ = writer.finish();
    }
}
