//! Reflection-driven binary encoding.
//!
//! Fields are written in ascending field-number order. Plain scalar and
//! enum fields are omitted at their zero value; `optional` fields and oneof
//! members are written whenever set, zero included. Map entries always
//! carry both key and value sub-fields. Preserved unknown fields are
//! flushed after the schema fields.

use crate::descriptor::{
    FieldInfo, FieldKind, LongRepr, MAX_SAFE_NUMBER, MapValue, MessageInfo, Repeat, ScalarType,
};
use crate::error::EncodeError;
use crate::registry::TypeRegistry;
use crate::value::{DynamicMessage, MapKey, Value};
use crate::wire::WireType;
use crate::writer::BinaryWriter;

/// Options for binary encoding.
#[derive(Clone, Copy, Debug)]
pub struct EncodeOptions {
    /// Re-emit unknown fields preserved by decoding. Defaults to `true`.
    pub write_unknown_fields: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            write_unknown_fields: true,
        }
    }
}

/// Encode a message to wire bytes.
pub fn encode(
    registry: &TypeRegistry,
    message: &DynamicMessage,
    options: EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    let info = registry
        .message(message.type_name())
        .ok_or_else(|| EncodeError::UnknownType(message.type_name().to_owned()))?;
    let mut writer = BinaryWriter::new();
    encode_into(registry, info, message, &mut writer, options)?;
    Ok(writer.finish())
}

/// Encode a message into an existing writer, without a length prefix.
pub fn encode_into(
    registry: &TypeRegistry,
    info: &MessageInfo,
    message: &DynamicMessage,
    writer: &mut BinaryWriter,
    options: EncodeOptions,
) -> Result<(), EncodeError> {
    for field in info.fields() {
        let value = message.get(&field.local_name);
        match &field.kind {
            FieldKind::Map { key, value: value_kind } => {
                let Some(value) = value else { continue };
                let map = value
                    .as_map()
                    .ok_or_else(|| kind_error(info, field, "map", value))?;
                for (k, v) in map {
                    write_map_entry(registry, info, writer, field, *key, value_kind, k, v, options)?;
                }
            }
            _ if field.repeat != Repeat::No => {
                let Some(value) = value else { continue };
                let list = value
                    .as_list()
                    .ok_or_else(|| kind_error(info, field, "list", value))?;
                write_repeated(registry, info, writer, field, list, options)?;
            }
            FieldKind::Message(type_name) => {
                let Some(value) = value else { continue };
                let sub = value
                    .as_message()
                    .ok_or_else(|| kind_error(info, field, "message", value))?;
                let sub_info = registry
                    .message(type_name)
                    .ok_or_else(|| EncodeError::UnknownType(type_name.clone()))?;
                writer.tag(field.no, WireType::LengthDelimited).fork();
                encode_into(registry, sub_info, sub, writer, options)?;
                writer.join();
            }
            FieldKind::Scalar { scalar, long } => {
                let Some(value) = value else { continue };
                let emit = field.opt || field.oneof.is_some() || !is_scalar_zero(value);
                if emit {
                    check_safe_long(value, *long, &field.local_name)?;
                    writer.tag(field.no, scalar.wire_type());
                    write_scalar(info, writer, field, *scalar, value)?;
                }
            }
            FieldKind::Enum(enum_info) => {
                let Some(value) = value else { continue };
                let name = value
                    .as_enum_name()
                    .ok_or_else(|| kind_error(info, field, "enum", value))?;
                let number = enum_info.number_for_name(name);
                if field.opt || field.oneof.is_some() || number != 0 {
                    writer.tag(field.no, WireType::Varint).int32(number);
                }
            }
        }
    }
    if options.write_unknown_fields {
        for unknown in message.unknown_fields() {
            writer
                .tag(unknown.field_no, unknown.wire_type)
                .raw(&unknown.data);
        }
    }
    Ok(())
}

fn write_repeated(
    registry: &TypeRegistry,
    info: &MessageInfo,
    writer: &mut BinaryWriter,
    field: &FieldInfo,
    list: &[Value],
    options: EncodeOptions,
) -> Result<(), EncodeError> {
    if list.is_empty() {
        return Ok(());
    }
    match &field.kind {
        FieldKind::Scalar { scalar, long } => {
            if field.repeat == Repeat::Packed {
                writer.tag(field.no, WireType::LengthDelimited).fork();
                for value in list {
                    check_safe_long(value, *long, &field.local_name)?;
                    write_scalar(info, writer, field, *scalar, value)?;
                }
                writer.join();
            } else {
                for value in list {
                    check_safe_long(value, *long, &field.local_name)?;
                    writer.tag(field.no, scalar.wire_type());
                    write_scalar(info, writer, field, *scalar, value)?;
                }
            }
            Ok(())
        }
        FieldKind::Enum(enum_info) => {
            if field.repeat == Repeat::Packed {
                writer.tag(field.no, WireType::LengthDelimited).fork();
                for value in list {
                    let name = value
                        .as_enum_name()
                        .ok_or_else(|| kind_error(info, field, "enum", value))?;
                    writer.int32(enum_info.number_for_name(name));
                }
                writer.join();
            } else {
                for value in list {
                    let name = value
                        .as_enum_name()
                        .ok_or_else(|| kind_error(info, field, "enum", value))?;
                    writer
                        .tag(field.no, WireType::Varint)
                        .int32(enum_info.number_for_name(name));
                }
            }
            Ok(())
        }
        FieldKind::Message(type_name) => {
            let sub_info = registry
                .message(type_name)
                .ok_or_else(|| EncodeError::UnknownType(type_name.clone()))?;
            for value in list {
                let sub = value
                    .as_message()
                    .ok_or_else(|| kind_error(info, field, "message", value))?;
                writer.tag(field.no, WireType::LengthDelimited).fork();
                encode_into(registry, sub_info, sub, writer, options)?;
                writer.join();
            }
            Ok(())
        }
        FieldKind::Map { .. } => unreachable!("map fields cannot repeat"),
    }
}

#[allow(clippy::too_many_arguments)]
fn write_map_entry(
    registry: &TypeRegistry,
    info: &MessageInfo,
    writer: &mut BinaryWriter,
    field: &FieldInfo,
    key_type: ScalarType,
    value_kind: &MapValue,
    key: &MapKey,
    value: &Value,
    options: EncodeOptions,
) -> Result<(), EncodeError> {
    writer.tag(field.no, WireType::LengthDelimited).fork();
    // key and value are always written, defaults included
    writer.tag(1, key_type.wire_type());
    write_map_key(info, writer, field, key_type, key)?;
    match value_kind {
        MapValue::Scalar { scalar, long } => {
            check_safe_long(value, *long, &field.local_name)?;
            writer.tag(2, scalar.wire_type());
            write_scalar(info, writer, field, *scalar, value)?;
        }
        MapValue::Enum(enum_info) => {
            let name = value
                .as_enum_name()
                .ok_or_else(|| kind_error(info, field, "enum", value))?;
            writer
                .tag(2, WireType::Varint)
                .int32(enum_info.number_for_name(name));
        }
        MapValue::Message(type_name) => {
            let sub = value
                .as_message()
                .ok_or_else(|| kind_error(info, field, "message", value))?;
            let sub_info = registry
                .message(type_name)
                .ok_or_else(|| EncodeError::UnknownType(type_name.clone()))?;
            writer.tag(2, WireType::LengthDelimited).fork();
            encode_into(registry, sub_info, sub, writer, options)?;
            writer.join();
        }
    }
    writer.join();
    Ok(())
}

fn write_map_key(
    info: &MessageInfo,
    writer: &mut BinaryWriter,
    field: &FieldInfo,
    scalar: ScalarType,
    key: &MapKey,
) -> Result<(), EncodeError> {
    let mismatch = || EncodeError::ValueKind {
        type_name: info.type_name().to_owned(),
        field: field.local_name.clone(),
        expected: scalar.name(),
        found: key.kind_name(),
    };
    match (scalar, key) {
        (ScalarType::Bool, MapKey::Bool(v)) => writer.bool(*v),
        (ScalarType::Int32, MapKey::I32(v)) => writer.int32(*v),
        (ScalarType::Sint32, MapKey::I32(v)) => writer.sint32(*v),
        (ScalarType::Sfixed32, MapKey::I32(v)) => writer.sfixed32(*v),
        (ScalarType::Uint32, MapKey::U32(v)) => writer.uint32(*v),
        (ScalarType::Fixed32, MapKey::U32(v)) => writer.fixed32(*v),
        (ScalarType::Int64, MapKey::I64(v)) => writer.int64(*v),
        (ScalarType::Sint64, MapKey::I64(v)) => writer.sint64(*v),
        (ScalarType::Sfixed64, MapKey::I64(v)) => writer.sfixed64(*v),
        (ScalarType::Uint64, MapKey::U64(v)) => writer.uint64(*v),
        (ScalarType::Fixed64, MapKey::U64(v)) => writer.fixed64(*v),
        (ScalarType::String, MapKey::String(v)) => writer.string(v),
        _ => return Err(mismatch()),
    };
    Ok(())
}

fn write_scalar(
    info: &MessageInfo,
    writer: &mut BinaryWriter,
    field: &FieldInfo,
    scalar: ScalarType,
    value: &Value,
) -> Result<(), EncodeError> {
    let mismatch = || EncodeError::ValueKind {
        type_name: info.type_name().to_owned(),
        field: field.local_name.clone(),
        expected: scalar.name(),
        found: value.kind_name(),
    };
    match (scalar, value) {
        (ScalarType::Double, Value::F64(v)) => writer.double(*v),
        (ScalarType::Float, Value::F32(v)) => writer.float(*v),
        (ScalarType::Int64, Value::I64(v)) => writer.int64(*v),
        (ScalarType::Sint64, Value::I64(v)) => writer.sint64(*v),
        (ScalarType::Sfixed64, Value::I64(v)) => writer.sfixed64(*v),
        (ScalarType::Uint64, Value::U64(v)) => writer.uint64(*v),
        (ScalarType::Fixed64, Value::U64(v)) => writer.fixed64(*v),
        (ScalarType::Int32, Value::I32(v)) => writer.int32(*v),
        (ScalarType::Sint32, Value::I32(v)) => writer.sint32(*v),
        (ScalarType::Sfixed32, Value::I32(v)) => writer.sfixed32(*v),
        (ScalarType::Uint32, Value::U32(v)) => writer.uint32(*v),
        (ScalarType::Fixed32, Value::U32(v)) => writer.fixed32(*v),
        (ScalarType::Bool, Value::Bool(v)) => writer.bool(*v),
        (ScalarType::String, Value::String(v)) => writer.string(v),
        (ScalarType::Bytes, Value::Bytes(v)) => writer.bytes(v),
        _ => return Err(mismatch()),
    };
    Ok(())
}

fn is_scalar_zero(value: &Value) -> bool {
    match value {
        Value::Bool(v) => !v,
        Value::I32(v) => *v == 0,
        Value::U32(v) => *v == 0,
        Value::I64(v) => *v == 0,
        Value::U64(v) => *v == 0,
        Value::F32(v) => *v == 0.0,
        Value::F64(v) => *v == 0.0,
        Value::String(v) => v.is_empty(),
        Value::Bytes(v) => v.is_empty(),
        _ => false,
    }
}

fn check_safe_long(value: &Value, long: LongRepr, field: &str) -> Result<(), EncodeError> {
    if long != LongRepr::SafeNumber {
        return Ok(());
    }
    let out_of_range = match value {
        Value::I64(v) => v.unsigned_abs() > MAX_SAFE_NUMBER,
        Value::U64(v) => *v > MAX_SAFE_NUMBER,
        _ => false,
    };
    if out_of_range {
        let text = match value {
            Value::I64(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            _ => unreachable!(),
        };
        return Err(EncodeError::UnsafeLong {
            field: field.to_owned(),
            value: text,
        });
    }
    Ok(())
}

fn kind_error(
    info: &MessageInfo,
    field: &FieldInfo,
    expected: &'static str,
    found: &Value,
) -> EncodeError {
    EncodeError::ValueKind {
        type_name: info.type_name().to_owned(),
        field: field.local_name.clone(),
        expected,
        found: found.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{DecodeOptions, decode};
    use crate::descriptor::EnumInfo;
    use crate::unknown::UnknownFieldPolicy;

    fn registry() -> TypeRegistry {
        let corpus = EnumInfo::new("test.Corpus", &[("UNIVERSAL", 0), ("WEB", 1)]);
        TypeRegistry::new()
            .with_message(MessageInfo::new(
                "test.Inner",
                vec![FieldInfo::scalar(1, "a", ScalarType::Int32)],
            ))
            .with_message(MessageInfo::new(
                "test.Outer",
                vec![
                    FieldInfo::scalar(1, "id", ScalarType::Int32),
                    FieldInfo::scalar(2, "name", ScalarType::String),
                    FieldInfo::scalar(3, "flag", ScalarType::Bool).optional(),
                    FieldInfo::message(4, "inner", "test.Inner"),
                    FieldInfo::scalar(5, "nums", ScalarType::Int32).repeated(),
                    FieldInfo::scalar(6, "words", ScalarType::String).repeated(),
                    FieldInfo::enumeration(7, "corpus", corpus),
                    FieldInfo::map(
                        8,
                        "counts",
                        ScalarType::String,
                        MapValue::scalar(ScalarType::Uint32),
                    ),
                    FieldInfo::scalar(9, "big", ScalarType::Uint64)
                        .with_long_repr(LongRepr::SafeNumber),
                ],
            ))
    }

    #[test]
    fn zeroed_message_encodes_to_nothing() {
        let registry = registry();
        let msg = registry.create("test.Outer").unwrap();
        let bytes = encode(&registry, &msg, EncodeOptions::default()).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn plain_defaults_are_omitted_but_optional_is_written() {
        let registry = registry();
        let mut msg = registry.create("test.Outer").unwrap();
        msg.set("flag", Value::Bool(false));
        let bytes = encode(&registry, &msg, EncodeOptions::default()).unwrap();
        // optional bool at its default still yields field 3, varint 0
        assert_eq!(bytes, [0x18, 0x00]);
    }

    #[test]
    fn known_field_wire_layout() {
        let registry = registry();
        let mut msg = registry.create("test.Outer").unwrap();
        msg.set("id", Value::I32(150));
        msg.set("name", Value::String("testing".into()));
        let bytes = encode(&registry, &msg, EncodeOptions::default()).unwrap();
        assert_eq!(
            bytes,
            [0x08, 0x96, 0x01, 0x12, 0x07, b't', b'e', b's', b't', b'i', b'n', b'g'],
        );
    }

    #[test]
    fn packed_and_unpacked_repeats() {
        let registry = registry();
        let mut msg = registry.create("test.Outer").unwrap();
        msg.set(
            "nums",
            Value::List(vec![Value::I32(3), Value::I32(270)]),
        );
        msg.set(
            "words",
            Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
        );
        let bytes = encode(&registry, &msg, EncodeOptions::default()).unwrap();
        assert_eq!(
            bytes,
            [
                0x2a, 0x03, 0x03, 0x8e, 0x02, // field 5 packed: 3, 270
                0x32, 0x01, b'a', // field 6 "a"
                0x32, 0x01, b'b', // field 6 "b"
            ],
        );
    }

    #[test]
    fn map_entries_always_write_key_and_value() {
        let registry = registry();
        let mut msg = registry.create("test.Outer").unwrap();
        msg.get_mut("counts")
            .and_then(Value::as_map_mut)
            .unwrap()
            .insert(MapKey::String(String::new()), Value::U32(0));
        let bytes = encode(&registry, &msg, EncodeOptions::default()).unwrap();
        // entry: len 4, key tag + empty string, value tag + 0
        assert_eq!(bytes, [0x42, 0x04, 0x0a, 0x00, 0x10, 0x00]);
    }

    #[test]
    fn empty_submessage_is_written_when_set() {
        let registry = registry();
        let mut msg = registry.create("test.Outer").unwrap();
        let inner = registry.create("test.Inner").unwrap();
        msg.set("inner", Value::Message(inner));
        let bytes = encode(&registry, &msg, EncodeOptions::default()).unwrap();
        assert_eq!(bytes, [0x22, 0x00]);
    }

    #[test]
    fn unknown_fields_reencode_verbatim() {
        let registry = registry();
        let mut w = BinaryWriter::new();
        w.tag(1, WireType::Varint).int32(5);
        w.tag(99, WireType::LengthDelimited).string("opaque");
        w.tag(100, WireType::Varint).uint32(7);
        let original = w.finish();

        let msg = decode(&registry, "test.Outer", &original, DecodeOptions::default()).unwrap();
        let again = encode(&registry, &msg, EncodeOptions::default()).unwrap();
        assert_eq!(again, original);

        let without = encode(
            &registry,
            &msg,
            EncodeOptions {
                write_unknown_fields: false,
            },
        )
        .unwrap();
        assert_eq!(without, [0x08, 0x05]);
    }

    #[test]
    fn value_kind_mismatch_is_reported() {
        let registry = registry();
        let mut msg = registry.create("test.Outer").unwrap();
        msg.set("id", Value::String("oops".into()));
        let err = encode(&registry, &msg, EncodeOptions::default()).unwrap_err();
        assert_eq!(
            err,
            EncodeError::ValueKind {
                type_name: "test.Outer".into(),
                field: "id".into(),
                expected: "int32",
                found: "string",
            },
        );
    }

    #[test]
    fn safe_number_range_is_enforced() {
        let registry = registry();
        let mut msg = registry.create("test.Outer").unwrap();
        msg.set("big", Value::U64(MAX_SAFE_NUMBER + 1));
        let err = encode(&registry, &msg, EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, EncodeError::UnsafeLong { .. }));
    }

    #[test]
    fn roundtrip_preserves_all_field_shapes() {
        let registry = registry();
        let mut msg = registry.create("test.Outer").unwrap();
        msg.set("id", Value::I32(-7));
        msg.set("flag", Value::Bool(true));
        msg.set("corpus", Value::Enum("WEB".into()));
        msg.set(
            "nums",
            Value::List(vec![Value::I32(1), Value::I32(-2), Value::I32(3)]),
        );
        let mut inner = registry.create("test.Inner").unwrap();
        inner.set("a", Value::I32(41));
        msg.set("inner", Value::Message(inner));
        msg.get_mut("counts")
            .and_then(Value::as_map_mut)
            .unwrap()
            .extend([
                (MapKey::String("x".into()), Value::U32(1)),
                (MapKey::String("y".into()), Value::U32(2)),
            ]);
        msg.set("big", Value::U64(MAX_SAFE_NUMBER));

        let bytes = encode(&registry, &msg, EncodeOptions::default()).unwrap();
        let back = decode(
            &registry,
            "test.Outer",
            &bytes,
            DecodeOptions {
                unknown_fields: UnknownFieldPolicy::Deny,
            },
        )
        .unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.get("name"), Some(&Value::String(String::new())));
        assert_eq!(
            back.get("inner").and_then(Value::as_message).unwrap().get("a"),
            Some(&Value::I32(41)),
        );
    }
}
