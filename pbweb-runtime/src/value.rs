//! Dynamic message values.
//!
//! Messages are held as [`DynamicMessage`]: an ordered list of
//! (local field name, optional [`Value`]) entries mirroring the schema,
//! plus any unknown fields preserved from decoding. Instances are created
//! zeroed from a [`MessageInfo`] and mutated in place.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::descriptor::{FieldInfo, FieldKind, MessageInfo, Repeat, ScalarType};
use crate::error::EncodeError;
use crate::unknown::UnknownField;

/// A single field value.
///
/// Which variant a field holds is dictated by its [`FieldKind`]: the codec
/// writes exactly one variant per scalar type and reports
/// [`EncodeError::ValueKind`] when an instance disagrees with its schema.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    /// Enum value by declared name.
    Enum(String),
    Message(DynamicMessage),
    /// Repeated field payload.
    List(Vec<Value>),
    /// Map field payload.
    Map(BTreeMap<MapKey, Value>),
}

impl Value {
    /// The zero value of a scalar type.
    pub fn zero_of_scalar(scalar: ScalarType) -> Value {
        match scalar {
            ScalarType::Double => Value::F64(0.0),
            ScalarType::Float => Value::F32(0.0),
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => Value::I64(0),
            ScalarType::Uint64 | ScalarType::Fixed64 => Value::U64(0),
            ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => Value::I32(0),
            ScalarType::Uint32 | ScalarType::Fixed32 => Value::U32(0),
            ScalarType::Bool => Value::Bool(false),
            ScalarType::String => Value::String(String::new()),
            ScalarType::Bytes => Value::Bytes(Bytes::new()),
        }
    }

    /// Variant name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Declared name of an enum value.
    pub fn as_enum_name(&self) -> Option<&str> {
        match self {
            Value::Enum(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut DynamicMessage> {
        match self {
            Value::Message(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<MapKey, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<MapKey, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }
}

/// A map field key. Keys are integral or string scalars.
///
/// The derived order sorts by variant first, then by value; within one map
/// every key holds the same variant, so entries iterate in plain key order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    String(String),
}

impl MapKey {
    /// The zero key of a map key type.
    ///
    /// # Panics
    ///
    /// Panics for scalar types that are invalid as map keys.
    pub fn zero_of_scalar(scalar: ScalarType) -> MapKey {
        match scalar {
            ScalarType::Bool => MapKey::Bool(false),
            ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => MapKey::I32(0),
            ScalarType::Uint32 | ScalarType::Fixed32 => MapKey::U32(0),
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => MapKey::I64(0),
            ScalarType::Uint64 | ScalarType::Fixed64 => MapKey::U64(0),
            ScalarType::String => MapKey::String(String::new()),
            _ => panic!("invalid map key type"),
        }
    }

    /// Variant name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MapKey::Bool(_) => "bool",
            MapKey::I32(_) => "i32",
            MapKey::U32(_) => "u32",
            MapKey::I64(_) => "i64",
            MapKey::U64(_) => "u64",
            MapKey::String(_) => "string",
        }
    }
}

impl fmt::Display for MapKey {
    /// Canonical text form: booleans render `"true"`/`"false"`, integers
    /// in decimal, strings verbatim.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(v) => f.write_str(if *v { "true" } else { "false" }),
            MapKey::I32(v) => write!(f, "{v}"),
            MapKey::U32(v) => write!(f, "{v}"),
            MapKey::I64(v) => write!(f, "{v}"),
            MapKey::U64(v) => write!(f, "{v}"),
            MapKey::String(v) => f.write_str(v),
        }
    }
}

/// A message instance driven entirely by its schema.
///
/// Entries are kept in schema order (ascending field number). Plain scalar
/// and enum fields always hold a value; message fields, `optional` fields
/// and oneof members are `None` until set; repeated and map fields hold an
/// empty list or map. Unknown fields seen while decoding are preserved and
/// re-emitted on encode.
///
/// Derived equality is structural and includes unknown fields. Schema-aware
/// comparison that ignores unknown fields is
/// [`reflection_equals`](crate::reflection_equals).
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicMessage {
    type_name: String,
    entries: Vec<(String, Option<Value>)>,
    unknown: Vec<UnknownField>,
}

fn zero_entry(field: &FieldInfo) -> Option<Value> {
    if let FieldKind::Map { .. } = field.kind {
        return Some(Value::Map(BTreeMap::new()));
    }
    if field.repeat != Repeat::No {
        return Some(Value::List(Vec::new()));
    }
    if field.opt || field.oneof.is_some() {
        return None;
    }
    match &field.kind {
        FieldKind::Scalar { scalar, .. } => Some(Value::zero_of_scalar(*scalar)),
        FieldKind::Enum(info) => Some(Value::Enum(info.zero_name().to_owned())),
        FieldKind::Message(_) => None,
        FieldKind::Map { .. } => unreachable!(),
    }
}

impl DynamicMessage {
    /// Create a zeroed instance of `info`.
    pub fn zeroed(info: &MessageInfo) -> Self {
        Self {
            type_name: info.type_name().to_owned(),
            entries: info
                .fields()
                .iter()
                .map(|f| (f.local_name.clone(), zero_entry(f)))
                .collect(),
            unknown: Vec::new(),
        }
    }

    /// Fully-qualified type name of the schema this instance was created
    /// from.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Current value of a field; `None` when the field is unset or the name
    /// is not part of the schema.
    pub fn get(&self, local_name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == local_name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn get_mut(&mut self, local_name: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == local_name)
            .and_then(|(_, v)| v.as_mut())
    }

    /// Set a field value.
    ///
    /// This is a plain assignment; setting a oneof member this way does not
    /// clear its siblings, use [`DynamicMessage::set_oneof`] for members.
    ///
    /// # Panics
    ///
    /// Panics when `local_name` is not a field of this message.
    pub fn set(&mut self, local_name: &str, value: Value) -> &mut Self {
        *self.entry_mut(local_name) = Some(value);
        self
    }

    /// Select one member of a oneof group: clears every other member of the
    /// same group, then sets `local_name`.
    ///
    /// # Panics
    ///
    /// Panics when `local_name` is not a oneof member of `info`.
    pub fn set_oneof(&mut self, info: &MessageInfo, local_name: &str, value: Value) -> &mut Self {
        let group = info
            .field(local_name)
            .and_then(|f| f.oneof.clone())
            .unwrap_or_else(|| panic!("{local_name} is not a oneof member"));
        for sibling in info.fields() {
            if sibling.oneof.as_deref() == Some(&group) && sibling.local_name != local_name {
                *self.entry_mut(&sibling.local_name) = None;
            }
        }
        self.set(local_name, value)
    }

    /// Reset a field to its zeroed state: the zero value for plain scalar
    /// and enum fields, empty for repeated and map fields, unset otherwise.
    ///
    /// # Panics
    ///
    /// Panics when `local_name` is not a field of `info`.
    pub fn clear(&mut self, info: &MessageInfo, local_name: &str) -> &mut Self {
        let field = info
            .field(local_name)
            .unwrap_or_else(|| panic!("no field {local_name} in {}", info.type_name()));
        *self.entry_mut(local_name) = zero_entry(field);
        self
    }

    /// The selected member of a oneof group, if any.
    pub fn oneof_selected<'a>(
        &'a self,
        info: &MessageInfo,
        group: &str,
    ) -> Option<(&'a str, &'a Value)> {
        for field in info.fields() {
            if field.oneof.as_deref() == Some(group) {
                if let Some((n, Some(v))) =
                    self.entries.iter().find(|(n, _)| *n == field.local_name)
                {
                    return Some((n.as_str(), v));
                }
            }
        }
        None
    }

    /// Decimal string form of a 64-bit integer field, when set.
    pub fn long_text(&self, local_name: &str) -> Option<String> {
        match self.get(local_name)? {
            Value::I64(v) => Some(v.to_string()),
            Value::U64(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Set a 64-bit integer field from its decimal string form. Signedness
    /// follows the field's scalar type.
    ///
    /// # Errors
    ///
    /// [`EncodeError::MalformedLongText`] when `text` is not a decimal
    /// integer in range.
    ///
    /// # Panics
    ///
    /// Panics when `local_name` is not a 64-bit integer field of `info`.
    pub fn set_long_text(
        &mut self,
        info: &MessageInfo,
        local_name: &str,
        text: &str,
    ) -> Result<(), EncodeError> {
        let field = info
            .field(local_name)
            .unwrap_or_else(|| panic!("no field {local_name} in {}", info.type_name()));
        let FieldKind::Scalar { scalar, .. } = field.kind else {
            panic!("{local_name} is not a 64-bit integer field");
        };
        let malformed = || EncodeError::MalformedLongText {
            field: local_name.to_owned(),
        };
        let value = match scalar {
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => {
                Value::I64(text.parse().map_err(|_| malformed())?)
            }
            ScalarType::Uint64 | ScalarType::Fixed64 => {
                Value::U64(text.parse().map_err(|_| malformed())?)
            }
            _ => panic!("{local_name} is not a 64-bit integer field"),
        };
        self.set(local_name, value);
        Ok(())
    }

    /// Entries in schema order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_ref()))
    }

    /// Unknown fields preserved from decoding, in wire order.
    pub fn unknown_fields(&self) -> &[UnknownField] {
        &self.unknown
    }

    pub fn push_unknown(&mut self, field: UnknownField) {
        self.unknown.push(field);
    }

    pub fn clear_unknown_fields(&mut self) {
        self.unknown.clear();
    }

    fn entry_mut(&mut self, local_name: &str) -> &mut Option<Value> {
        let type_name = &self.type_name;
        self.entries
            .iter_mut()
            .find(|(n, _)| n == local_name)
            .map(|(_, v)| v)
            .unwrap_or_else(|| panic!("no field {local_name} in {type_name}"))
    }
}
