//! Reflection-driven binary decoding.
//!
//! The decoder walks wire data tag by tag and dispatches on the schema
//! entry for each field number. Wire types of known fields are trusted from
//! the schema and not validated against the tag; unknown fields are handled
//! per [`UnknownFieldPolicy`].

use bytes::Bytes;

use crate::descriptor::{
    FieldInfo, FieldKind, LongRepr, MAX_SAFE_NUMBER, MapValue, MessageInfo, Repeat, ScalarType,
};
use crate::error::DecodeError;
use crate::reader::BinaryReader;
use crate::registry::TypeRegistry;
use crate::unknown::{UnknownField, UnknownFieldPolicy};
use crate::value::{DynamicMessage, MapKey, Value};
use crate::wire::WireType;

/// Options for binary decoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeOptions {
    /// What to do with fields absent from the schema.
    pub unknown_fields: UnknownFieldPolicy,
}

/// Decode `bytes` into a fresh zeroed instance of `type_name`.
pub fn decode(
    registry: &TypeRegistry,
    type_name: &str,
    bytes: &[u8],
    options: DecodeOptions,
) -> Result<DynamicMessage, DecodeError> {
    let info = registry
        .message(type_name)
        .ok_or_else(|| DecodeError::UnknownType(type_name.to_owned()))?;
    let mut message = DynamicMessage::zeroed(info);
    merge_from(registry, info, &mut message, bytes, options)?;
    Ok(message)
}

/// Merge wire data into an existing instance.
///
/// Singular scalar and enum fields take the last value seen; singular
/// message fields merge recursively into the present value; repeated fields
/// append; map fields insert with later entries replacing earlier ones.
pub fn merge_from(
    registry: &TypeRegistry,
    info: &MessageInfo,
    message: &mut DynamicMessage,
    bytes: &[u8],
    options: DecodeOptions,
) -> Result<(), DecodeError> {
    let mut reader = BinaryReader::new(bytes);
    while reader.remaining() > 0 {
        let (field_no, wire_type) = reader.tag()?;
        match info.field_by_no(field_no) {
            Some(field) => {
                read_field(registry, info, message, &mut reader, field, wire_type, options)?
            }
            None => read_unknown(info, message, &mut reader, field_no, wire_type, options)?,
        }
    }
    Ok(())
}

fn read_unknown(
    info: &MessageInfo,
    message: &mut DynamicMessage,
    reader: &mut BinaryReader<'_>,
    field_no: u32,
    wire_type: WireType,
    options: DecodeOptions,
) -> Result<(), DecodeError> {
    match options.unknown_fields {
        UnknownFieldPolicy::Deny => Err(DecodeError::UnknownField {
            type_name: info.type_name().to_owned(),
            field_no,
            wire_type: wire_type as u8,
        }),
        UnknownFieldPolicy::Discard => {
            reader.skip(wire_type, field_no)?;
            Ok(())
        }
        UnknownFieldPolicy::Keep => {
            let data = reader.skip(wire_type, field_no)?;
            message.push_unknown(UnknownField {
                field_no,
                wire_type,
                data: Bytes::copy_from_slice(data),
            });
            Ok(())
        }
    }
}

fn read_field(
    registry: &TypeRegistry,
    info: &MessageInfo,
    message: &mut DynamicMessage,
    reader: &mut BinaryReader<'_>,
    field: &FieldInfo,
    wire_type: WireType,
    options: DecodeOptions,
) -> Result<(), DecodeError> {
    match &field.kind {
        FieldKind::Map { key, value } => {
            read_map_entry(registry, info, message, reader, field, *key, value, options)
        }
        _ if field.repeat != Repeat::No => {
            read_repeated(registry, message, reader, field, wire_type, options)
        }
        FieldKind::Message(type_name) => {
            let sub_info = registry
                .message(type_name)
                .ok_or_else(|| DecodeError::UnknownType(type_name.clone()))?;
            let data = reader.bytes()?;
            clear_other_members(info, message, field);
            if !matches!(message.get(&field.local_name), Some(Value::Message(_))) {
                message.set(
                    &field.local_name,
                    Value::Message(DynamicMessage::zeroed(sub_info)),
                );
            }
            let Some(Value::Message(sub)) = message.get_mut(&field.local_name) else {
                unreachable!()
            };
            merge_from(registry, sub_info, sub, data, options)
        }
        FieldKind::Scalar { scalar, long } => {
            let value = read_scalar(reader, *scalar, *long, &field.local_name)?;
            clear_other_members(info, message, field);
            message.set(&field.local_name, value);
            Ok(())
        }
        FieldKind::Enum(enum_info) => {
            let number = reader.int32()?;
            let value = Value::Enum(enum_info.name_or_first(number).to_owned());
            clear_other_members(info, message, field);
            message.set(&field.local_name, value);
            Ok(())
        }
    }
}

/// Selecting a oneof member unsets every other member of its group.
fn clear_other_members(info: &MessageInfo, message: &mut DynamicMessage, field: &FieldInfo) {
    if let Some(group) = &field.oneof {
        for sibling in info.fields() {
            if sibling.oneof.as_deref() == Some(group) && sibling.no != field.no {
                message.clear(info, &sibling.local_name);
            }
        }
    }
}

fn read_repeated(
    registry: &TypeRegistry,
    message: &mut DynamicMessage,
    reader: &mut BinaryReader<'_>,
    field: &FieldInfo,
    wire_type: WireType,
    options: DecodeOptions,
) -> Result<(), DecodeError> {
    // The declared repeat mode is not binding on input: packable elements
    // are accepted both packed and one per tag.
    match &field.kind {
        FieldKind::Scalar { scalar, long } => {
            if wire_type == WireType::LengthDelimited && scalar.is_packable() {
                let data = reader.bytes()?;
                let mut packed = BinaryReader::new(data);
                while packed.remaining() > 0 {
                    let value = read_scalar(&mut packed, *scalar, *long, &field.local_name)?;
                    push_element(message, field, value);
                }
            } else {
                let value = read_scalar(reader, *scalar, *long, &field.local_name)?;
                push_element(message, field, value);
            }
            Ok(())
        }
        FieldKind::Enum(enum_info) => {
            if wire_type == WireType::LengthDelimited {
                let data = reader.bytes()?;
                let mut packed = BinaryReader::new(data);
                while packed.remaining() > 0 {
                    let number = packed.int32()?;
                    push_element(
                        message,
                        field,
                        Value::Enum(enum_info.name_or_first(number).to_owned()),
                    );
                }
            } else {
                let number = reader.int32()?;
                push_element(
                    message,
                    field,
                    Value::Enum(enum_info.name_or_first(number).to_owned()),
                );
            }
            Ok(())
        }
        FieldKind::Message(type_name) => {
            let sub_info = registry
                .message(type_name)
                .ok_or_else(|| DecodeError::UnknownType(type_name.clone()))?;
            let data = reader.bytes()?;
            let mut sub = DynamicMessage::zeroed(sub_info);
            merge_from(registry, sub_info, &mut sub, data, options)?;
            push_element(message, field, Value::Message(sub));
            Ok(())
        }
        FieldKind::Map { .. } => unreachable!("map fields cannot repeat"),
    }
}

fn push_element(message: &mut DynamicMessage, field: &FieldInfo, value: Value) {
    match message.get_mut(&field.local_name) {
        Some(Value::List(list)) => list.push(value),
        _ => {
            message.set(&field.local_name, Value::List(vec![value]));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn read_map_entry(
    registry: &TypeRegistry,
    info: &MessageInfo,
    message: &mut DynamicMessage,
    reader: &mut BinaryReader<'_>,
    field: &FieldInfo,
    key_type: ScalarType,
    value_kind: &MapValue,
    options: DecodeOptions,
) -> Result<(), DecodeError> {
    let data = reader.bytes()?;
    let mut entry = BinaryReader::new(data);
    let mut key: Option<MapKey> = None;
    let mut value: Option<Value> = None;
    while entry.remaining() > 0 {
        let (no, _) = entry.tag()?;
        match no {
            1 => key = Some(read_map_key(&mut entry, key_type)?),
            2 => {
                value = Some(read_map_value(
                    registry, &mut entry, field, value_kind, options,
                )?)
            }
            _ => {
                return Err(DecodeError::UnknownMapEntryField {
                    type_name: format!("{}#{}", info.type_name(), field.name),
                    field_no: no,
                });
            }
        }
    }
    // Entries written by a conforming encoder always carry both sub-fields,
    // but a missing key or value still defaults like any proto3 field.
    let key = key.unwrap_or_else(|| MapKey::zero_of_scalar(key_type));
    let value = match value {
        Some(v) => v,
        None => zero_map_value(registry, value_kind)?,
    };
    match message.get_mut(&field.local_name) {
        Some(Value::Map(map)) => {
            map.insert(key, value);
        }
        _ => {
            message.set(&field.local_name, Value::Map([(key, value)].into()));
        }
    }
    Ok(())
}

fn read_map_key(reader: &mut BinaryReader<'_>, scalar: ScalarType) -> Result<MapKey, DecodeError> {
    Ok(match scalar {
        ScalarType::Bool => MapKey::Bool(reader.bool()?),
        ScalarType::Int32 => MapKey::I32(reader.int32()?),
        ScalarType::Sint32 => MapKey::I32(reader.sint32()?),
        ScalarType::Sfixed32 => MapKey::I32(reader.sfixed32()?),
        ScalarType::Uint32 => MapKey::U32(reader.uint32()?),
        ScalarType::Fixed32 => MapKey::U32(reader.fixed32()?),
        ScalarType::Int64 => MapKey::I64(reader.int64()?),
        ScalarType::Sint64 => MapKey::I64(reader.sint64()?),
        ScalarType::Sfixed64 => MapKey::I64(reader.sfixed64()?),
        ScalarType::Uint64 => MapKey::U64(reader.uint64()?),
        ScalarType::Fixed64 => MapKey::U64(reader.fixed64()?),
        ScalarType::String => MapKey::String(reader.string()?.to_owned()),
        _ => panic!("invalid map key type"),
    })
}

fn read_map_value(
    registry: &TypeRegistry,
    reader: &mut BinaryReader<'_>,
    field: &FieldInfo,
    value_kind: &MapValue,
    options: DecodeOptions,
) -> Result<Value, DecodeError> {
    match value_kind {
        MapValue::Scalar { scalar, long } => {
            read_scalar(reader, *scalar, *long, &field.local_name)
        }
        MapValue::Enum(enum_info) => {
            let number = reader.int32()?;
            Ok(Value::Enum(enum_info.name_or_first(number).to_owned()))
        }
        MapValue::Message(type_name) => {
            let sub_info = registry
                .message(type_name)
                .ok_or_else(|| DecodeError::UnknownType(type_name.clone()))?;
            let data = reader.bytes()?;
            let mut sub = DynamicMessage::zeroed(sub_info);
            merge_from(registry, sub_info, &mut sub, data, options)?;
            Ok(Value::Message(sub))
        }
    }
}

fn zero_map_value(registry: &TypeRegistry, value_kind: &MapValue) -> Result<Value, DecodeError> {
    Ok(match value_kind {
        MapValue::Scalar { scalar, .. } => Value::zero_of_scalar(*scalar),
        MapValue::Enum(enum_info) => Value::Enum(enum_info.zero_name().to_owned()),
        MapValue::Message(type_name) => {
            let sub_info = registry
                .message(type_name)
                .ok_or_else(|| DecodeError::UnknownType(type_name.clone()))?;
            Value::Message(DynamicMessage::zeroed(sub_info))
        }
    })
}

fn read_scalar(
    reader: &mut BinaryReader<'_>,
    scalar: ScalarType,
    long: LongRepr,
    field_name: &str,
) -> Result<Value, DecodeError> {
    let value = match scalar {
        ScalarType::Double => Value::F64(reader.double()?),
        ScalarType::Float => Value::F32(reader.float()?),
        ScalarType::Int64 => Value::I64(reader.int64()?),
        ScalarType::Uint64 => Value::U64(reader.uint64()?),
        ScalarType::Int32 => Value::I32(reader.int32()?),
        ScalarType::Fixed64 => Value::U64(reader.fixed64()?),
        ScalarType::Fixed32 => Value::U32(reader.fixed32()?),
        ScalarType::Bool => Value::Bool(reader.bool()?),
        ScalarType::String => Value::String(reader.string()?.to_owned()),
        ScalarType::Bytes => Value::Bytes(Bytes::copy_from_slice(reader.bytes()?)),
        ScalarType::Uint32 => Value::U32(reader.uint32()?),
        ScalarType::Sfixed32 => Value::I32(reader.sfixed32()?),
        ScalarType::Sfixed64 => Value::I64(reader.sfixed64()?),
        ScalarType::Sint32 => Value::I32(reader.sint32()?),
        ScalarType::Sint64 => Value::I64(reader.sint64()?),
    };
    if long == LongRepr::SafeNumber {
        let out_of_range = match &value {
            Value::I64(v) => v.unsigned_abs() > MAX_SAFE_NUMBER,
            Value::U64(v) => *v > MAX_SAFE_NUMBER,
            _ => false,
        };
        if out_of_range {
            return Err(DecodeError::UnsafeLong {
                field: field_name.to_owned(),
                value: match &value {
                    Value::I64(v) => v.to_string(),
                    Value::U64(v) => v.to_string(),
                    _ => unreachable!(),
                },
            });
        }
    }
    Ok(value)
}
