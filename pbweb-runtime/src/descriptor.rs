//! Reflection schema: field descriptors and enum tables.
//!
//! A schema provider (normally generated code or a descriptor interpreter)
//! supplies one [`MessageInfo`] per message and one [`EnumInfo`] per enum.
//! The codec drives all encoding and decoding from these tables alone; no
//! per-message logic is generated.
//!
//! Schema construction errors (duplicate field numbers, repeated map fields,
//! empty enums) are programmer errors and panic.

use std::sync::Arc;

use crate::wire::WireType;

/// Protobuf scalar types, numbered as in `google.protobuf.FieldDescriptorProto.Type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ScalarType {
    Double = 1,
    Float = 2,
    Int64 = 3,
    Uint64 = 4,
    Int32 = 5,
    Fixed64 = 6,
    Fixed32 = 7,
    Bool = 8,
    String = 9,
    // 10 = group, 11 = message, 14 = enum: not scalars
    Bytes = 12,
    Uint32 = 13,
    Sfixed32 = 15,
    Sfixed64 = 16,
    Sint32 = 17,
    Sint64 = 18,
}

impl ScalarType {
    /// The wire type a single value of this scalar uses.
    pub fn wire_type(self) -> WireType {
        match self {
            ScalarType::Double | ScalarType::Fixed64 | ScalarType::Sfixed64 => WireType::Bit64,
            ScalarType::Float | ScalarType::Fixed32 | ScalarType::Sfixed32 => WireType::Bit32,
            ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
            _ => WireType::Varint,
        }
    }

    /// Whether repeated values of this scalar may use packed encoding.
    /// String and bytes never pack.
    pub fn is_packable(self) -> bool {
        !matches!(self, ScalarType::String | ScalarType::Bytes)
    }

    /// Proto name of this scalar type.
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int64 => "int64",
            ScalarType::Uint64 => "uint64",
            ScalarType::Int32 => "int32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Uint32 => "uint32",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
        }
    }

    /// Whether this scalar is a 64-bit integer subject to [`LongRepr`].
    pub fn is_long(self) -> bool {
        matches!(
            self,
            ScalarType::Int64
                | ScalarType::Uint64
                | ScalarType::Fixed64
                | ScalarType::Sfixed64
                | ScalarType::Sint64
        )
    }
}

/// Caller-selected representation policy for 64-bit integer fields.
///
/// Storage is always a native `i64`/`u64`, which round-trips exactly under
/// every policy. `SafeNumber` additionally rejects values outside
/// ±(2^53 − 1) at decode and encode time; `Text` admits decimal-string
/// accessors on the message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LongRepr {
    /// Native 64-bit integer.
    #[default]
    Native,
    /// Decimal string representation.
    Text,
    /// Double-safe integer, |v| ≤ 2^53 − 1.
    SafeNumber,
}

/// Largest integer magnitude exactly representable in a double.
pub const MAX_SAFE_NUMBER: u64 = (1 << 53) - 1;

/// Repeat mode of a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Repeat {
    /// Not repeated.
    #[default]
    No,
    /// Repeated, packed on the wire (numeric scalars and enums).
    Packed,
    /// Repeated, one tag per value.
    Unpacked,
}

/// Value type of a map field. Map values may be any scalar, enum or message;
/// they are never repeated and never maps themselves.
#[derive(Clone, Debug)]
pub enum MapValue {
    Scalar { scalar: ScalarType, long: LongRepr },
    Enum(Arc<EnumInfo>),
    /// Message value, referenced by type name through the registry.
    Message(String),
}

impl MapValue {
    /// Plain scalar map value with the default long representation.
    pub fn scalar(scalar: ScalarType) -> Self {
        MapValue::Scalar {
            scalar,
            long: LongRepr::default(),
        }
    }
}

/// What a field holds, dispatched by pattern match everywhere in the codec.
#[derive(Clone, Debug)]
pub enum FieldKind {
    Scalar { scalar: ScalarType, long: LongRepr },
    /// Enums embed their table directly; enum types cannot be recursive.
    Enum(Arc<EnumInfo>),
    /// Message fields reference their schema by type name through the
    /// registry, which keeps recursive message types representable.
    Message(String),
    Map { key: ScalarType, value: MapValue },
}

/// Descriptor of a single message field.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    /// Field number, unique within the message, ≥ 1.
    pub no: u32,
    /// Name as declared in the proto source.
    pub name: String,
    /// Name used on the message instance. Defaults to `name`.
    pub local_name: String,
    pub kind: FieldKind,
    pub repeat: Repeat,
    /// Oneof group name, if this field is a oneof member.
    pub oneof: Option<String>,
    /// Explicit presence (`optional` in proto3).
    pub opt: bool,
}

impl FieldInfo {
    fn new(no: u32, name: &str, kind: FieldKind) -> Self {
        assert!(no >= 1, "field number must be >= 1");
        Self {
            no,
            name: name.to_owned(),
            local_name: name.to_owned(),
            kind,
            repeat: Repeat::No,
            oneof: None,
            opt: false,
        }
    }

    /// A scalar field with the default long representation.
    pub fn scalar(no: u32, name: &str, scalar: ScalarType) -> Self {
        Self::new(
            no,
            name,
            FieldKind::Scalar {
                scalar,
                long: LongRepr::default(),
            },
        )
    }

    /// An enum field.
    pub fn enumeration(no: u32, name: &str, info: Arc<EnumInfo>) -> Self {
        Self::new(no, name, FieldKind::Enum(info))
    }

    /// A message field referencing `type_name`.
    pub fn message(no: u32, name: &str, type_name: &str) -> Self {
        Self::new(no, name, FieldKind::Message(type_name.to_owned()))
    }

    /// A map field. Map keys are integral or string scalars; float, double
    /// and bytes keys are invalid.
    ///
    /// # Panics
    ///
    /// Panics on an invalid key type.
    pub fn map(no: u32, name: &str, key: ScalarType, value: MapValue) -> Self {
        assert!(
            !matches!(
                key,
                ScalarType::Double | ScalarType::Float | ScalarType::Bytes
            ),
            "invalid map key type"
        );
        Self::new(no, name, FieldKind::Map { key, value })
    }

    /// Mark repeated. Packs numeric scalars and enums; strings, bytes and
    /// messages stay unpacked.
    ///
    /// # Panics
    ///
    /// Panics for map fields and oneof members, which cannot repeat.
    pub fn repeated(mut self) -> Self {
        assert!(
            !matches!(self.kind, FieldKind::Map { .. }),
            "map fields cannot repeat"
        );
        assert!(self.oneof.is_none(), "oneof members cannot repeat");
        self.repeat = match &self.kind {
            FieldKind::Scalar { scalar, .. } if scalar.is_packable() => Repeat::Packed,
            FieldKind::Enum(_) => Repeat::Packed,
            _ => Repeat::Unpacked,
        };
        self
    }

    /// Force unpacked repeat (proto2 default, or `[packed = false]`).
    ///
    /// # Panics
    ///
    /// Panics for map fields and oneof members.
    pub fn unpacked(mut self) -> Self {
        assert!(
            !matches!(self.kind, FieldKind::Map { .. }),
            "map fields cannot repeat"
        );
        assert!(self.oneof.is_none(), "oneof members cannot repeat");
        self.repeat = Repeat::Unpacked;
        self
    }

    /// Mark explicit presence (proto3 `optional`).
    pub fn optional(mut self) -> Self {
        self.opt = true;
        self
    }

    /// Put this field into a oneof group.
    ///
    /// # Panics
    ///
    /// Panics for repeated and map fields.
    pub fn in_oneof(mut self, group: &str) -> Self {
        assert!(
            self.repeat == Repeat::No,
            "repeated fields cannot join a oneof"
        );
        assert!(
            !matches!(self.kind, FieldKind::Map { .. }),
            "map fields cannot join a oneof"
        );
        self.oneof = Some(group.to_owned());
        self
    }

    /// Override the instance-local name.
    pub fn with_local_name(mut self, local_name: &str) -> Self {
        self.local_name = local_name.to_owned();
        self
    }

    /// Select the 64-bit representation for a scalar field.
    ///
    /// # Panics
    ///
    /// Panics if the field is not a 64-bit integer scalar.
    pub fn with_long_repr(mut self, long: LongRepr) -> Self {
        match &mut self.kind {
            FieldKind::Scalar { scalar, long: l } if scalar.is_long() => *l = long,
            _ => panic!("long representation applies to 64-bit scalar fields only"),
        }
        self
    }
}

/// Descriptor of a message type: type name plus ordered field table.
#[derive(Clone, Debug)]
pub struct MessageInfo {
    type_name: String,
    fields: Vec<FieldInfo>,
}

impl MessageInfo {
    /// Build a message descriptor. Fields are ordered by field number.
    ///
    /// # Panics
    ///
    /// Panics on duplicate field numbers or duplicate local names.
    pub fn new(type_name: &str, mut fields: Vec<FieldInfo>) -> Self {
        fields.sort_by_key(|f| f.no);
        for pair in fields.windows(2) {
            assert!(
                pair[0].no != pair[1].no,
                "duplicate field number {} in {}",
                pair[0].no,
                type_name
            );
        }
        for (i, f) in fields.iter().enumerate() {
            assert!(
                fields[..i].iter().all(|g| g.local_name != f.local_name),
                "duplicate field name {} in {}",
                f.local_name,
                type_name
            );
        }
        Self {
            type_name: type_name.to_owned(),
            fields,
        }
    }

    /// Fully-qualified type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Fields in ascending field-number order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Look up a field by instance-local name.
    pub fn field(&self, local_name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.local_name == local_name)
    }

    /// Look up a field by field number.
    pub fn field_by_no(&self, no: u32) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.no == no)
    }
}

/// Descriptor of an enum type: declared (name, number) pairs in order.
///
/// The name table is bijective on names; several names may share one number
/// (aliases). Number→name lookups keep the FIRST declared name per number.
#[derive(Clone, Debug)]
pub struct EnumInfo {
    type_name: String,
    values: Vec<(String, i32)>,
    shared_prefix: Option<String>,
}

impl EnumInfo {
    /// Build an enum descriptor from declared (name, number) pairs.
    ///
    /// # Panics
    ///
    /// Panics if `values` is empty or contains a duplicate name.
    pub fn new(type_name: &str, values: &[(&str, i32)]) -> Arc<Self> {
        assert!(!values.is_empty(), "enum {type_name} has no values");
        for (i, (name, _)) in values.iter().enumerate() {
            assert!(
                values[..i].iter().all(|(n, _)| n != name),
                "duplicate name {name} in enum {type_name}"
            );
        }
        Arc::new(Self {
            type_name: type_name.to_owned(),
            values: values
                .iter()
                .map(|(n, v)| ((*n).to_owned(), *v))
                .collect(),
            shared_prefix: None,
        })
    }

    /// Record a shared prefix that was dropped from the declared names.
    pub fn with_shared_prefix(self: Arc<Self>, prefix: &str) -> Arc<Self> {
        let mut info = (*self).clone();
        info.shared_prefix = Some(prefix.to_owned());
        Arc::new(info)
    }

    /// Fully-qualified type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared (name, number) pairs in order.
    pub fn values(&self) -> impl Iterator<Item = (&str, i32)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// The prefix dropped from names, if any.
    pub fn shared_prefix(&self) -> Option<&str> {
        self.shared_prefix.as_deref()
    }

    /// First declared name.
    pub fn first_name(&self) -> &str {
        &self.values[0].0
    }

    /// Default value name: the name of number 0, or the first declared name
    /// when 0 is unmapped.
    pub fn zero_name(&self) -> &str {
        self.name_for_number(0).unwrap_or_else(|| self.first_name())
    }

    /// Name for a wire number. Aliased numbers collapse to the first
    /// declared name.
    pub fn name_for_number(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| *v == number)
            .map(|(n, _)| n.as_str())
    }

    /// Name for a wire number, falling back to the first declared name for
    /// unmapped numbers.
    pub fn name_or_first(&self, number: i32) -> &str {
        self.name_for_number(number)
            .unwrap_or_else(|| self.first_name())
    }

    /// Wire number for a name; unknown names map to 0.
    pub fn number_for_name(&self, name: &str) -> i32 {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    /// Whether `name` is declared.
    pub fn contains_name(&self, name: &str) -> bool {
        self.values.iter().any(|(n, _)| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_enum() -> Arc<EnumInfo> {
        EnumInfo::new("test.Simple", &[("ANY", 0), ("YES", 1), ("NO", 2)])
    }

    #[test]
    fn enum_lookups() {
        let e = simple_enum();
        assert_eq!(e.name_for_number(1), Some("YES"));
        assert_eq!(e.name_for_number(9), None);
        assert_eq!(e.name_or_first(9), "ANY");
        assert_eq!(e.number_for_name("NO"), 2);
        assert_eq!(e.number_for_name("MISSING"), 0);
        assert_eq!(e.zero_name(), "ANY");
    }

    #[test]
    fn enum_alias_keeps_first_name() {
        let e = EnumInfo::new("test.Alias", &[("A", 0), ("B", 1), ("ALSO_B", 1)]);
        assert_eq!(e.name_for_number(1), Some("B"));
        assert_eq!(e.number_for_name("ALSO_B"), 1);
    }

    #[test]
    fn enum_zero_name_falls_back_to_first() {
        let e = EnumInfo::new("test.NoZero", &[("ONE", 1), ("TWO", 2)]);
        assert_eq!(e.zero_name(), "ONE");
    }

    #[test]
    #[should_panic(expected = "has no values")]
    fn empty_enum_panics() {
        let _ = EnumInfo::new("test.Empty", &[]);
    }

    #[test]
    fn repeated_picks_packing_by_type() {
        let f = FieldInfo::scalar(1, "ints", ScalarType::Int32).repeated();
        assert_eq!(f.repeat, Repeat::Packed);
        let f = FieldInfo::scalar(2, "names", ScalarType::String).repeated();
        assert_eq!(f.repeat, Repeat::Unpacked);
        let f = FieldInfo::message(3, "items", "test.Item").repeated();
        assert_eq!(f.repeat, Repeat::Unpacked);
        let f = FieldInfo::enumeration(4, "units", simple_enum()).repeated();
        assert_eq!(f.repeat, Repeat::Packed);
    }

    #[test]
    #[should_panic(expected = "cannot repeat")]
    fn repeated_map_panics() {
        let _ = FieldInfo::map(
            1,
            "m",
            ScalarType::String,
            MapValue::scalar(ScalarType::Int32),
        )
        .repeated();
    }

    #[test]
    #[should_panic(expected = "cannot join a oneof")]
    fn repeated_oneof_panics() {
        let _ = FieldInfo::scalar(1, "x", ScalarType::Int32)
            .repeated()
            .in_oneof("choice");
    }

    #[test]
    #[should_panic(expected = "invalid map key type")]
    fn float_map_key_panics() {
        let _ = FieldInfo::map(
            1,
            "m",
            ScalarType::Double,
            MapValue::scalar(ScalarType::Int32),
        );
    }

    #[test]
    fn message_info_sorts_fields_by_number() {
        let info = MessageInfo::new(
            "test.M",
            vec![
                FieldInfo::scalar(3, "c", ScalarType::Int32),
                FieldInfo::scalar(1, "a", ScalarType::Int32),
                FieldInfo::scalar(2, "b", ScalarType::Int32),
            ],
        );
        let order: Vec<u32> = info.fields().iter().map(|f| f.no).collect();
        assert_eq!(order, [1, 2, 3]);
        assert_eq!(info.field("b").map(|f| f.no), Some(2));
        assert_eq!(info.field_by_no(3).map(|f| f.local_name.as_str()), Some("c"));
    }

    #[test]
    #[should_panic(expected = "duplicate field number")]
    fn duplicate_field_number_panics() {
        let _ = MessageInfo::new(
            "test.M",
            vec![
                FieldInfo::scalar(1, "a", ScalarType::Int32),
                FieldInfo::scalar(1, "b", ScalarType::Int32),
            ],
        );
    }
}
