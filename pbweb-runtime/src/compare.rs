//! Schema-driven equality and shape validation.

use crate::descriptor::{FieldInfo, FieldKind, MapValue, MessageInfo, Repeat, ScalarType};
use crate::registry::TypeRegistry;
use crate::value::{DynamicMessage, MapKey, Value};

/// Compare two message instances field by field against their schema.
///
/// `None == None` is true and a one-sided `None` is false, even when the
/// present side is all zeroes. Scalar fields compare by value with bytes
/// compared by content; message fields recurse; repeated fields compare
/// element-wise and maps entry-wise. Unknown fields do not participate.
///
/// # Panics
///
/// Panics when the schema references a message type that is missing from
/// `registry`.
pub fn reflection_equals(
    registry: &TypeRegistry,
    info: &MessageInfo,
    a: Option<&DynamicMessage>,
    b: Option<&DynamicMessage>,
) -> bool {
    let (a, b) = match (a, b) {
        (None, None) => return true,
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    if a.type_name() != b.type_name() {
        return false;
    }
    info.fields().iter().all(|field| {
        match (a.get(&field.local_name), b.get(&field.local_name)) {
            (None, None) => true,
            (Some(va), Some(vb)) => field_equals(registry, field, va, vb),
            _ => false,
        }
    })
}

fn field_equals(registry: &TypeRegistry, field: &FieldInfo, a: &Value, b: &Value) -> bool {
    if let FieldKind::Map { value, .. } = &field.kind {
        return match (a.as_map(), b.as_map()) {
            (Some(ma), Some(mb)) => {
                ma.len() == mb.len()
                    && ma.iter().zip(mb).all(|((ka, va), (kb, vb))| {
                        ka == kb && map_value_equals(registry, value, va, vb)
                    })
            }
            _ => false,
        };
    }
    if field.repeat != Repeat::No {
        return match (a.as_list(), b.as_list()) {
            (Some(la), Some(lb)) => {
                la.len() == lb.len()
                    && la
                        .iter()
                        .zip(lb)
                        .all(|(va, vb)| single_equals(registry, &field.kind, va, vb))
            }
            _ => false,
        };
    }
    single_equals(registry, &field.kind, a, b)
}

fn single_equals(registry: &TypeRegistry, kind: &FieldKind, a: &Value, b: &Value) -> bool {
    match kind {
        FieldKind::Message(type_name) => message_equals(registry, type_name, a, b),
        _ => a == b,
    }
}

fn map_value_equals(registry: &TypeRegistry, value_kind: &MapValue, a: &Value, b: &Value) -> bool {
    match value_kind {
        MapValue::Message(type_name) => message_equals(registry, type_name, a, b),
        _ => a == b,
    }
}

fn message_equals(registry: &TypeRegistry, type_name: &str, a: &Value, b: &Value) -> bool {
    let sub_info = resolve(registry, type_name);
    match (a.as_message(), b.as_message()) {
        (Some(ma), Some(mb)) => reflection_equals(registry, sub_info, Some(ma), Some(mb)),
        _ => false,
    }
}

fn resolve<'a>(registry: &'a TypeRegistry, type_name: &str) -> &'a MessageInfo {
    registry
        .message(type_name)
        .unwrap_or_else(|| panic!("no schema for {type_name}"))
}

/// Validates that a message instance matches the shape its schema requires.
///
/// With depth 0 only the presence of required entries is checked: plain
/// scalar and enum fields, repeated fields and map fields must be set, and
/// at most one member per oneof group may be set. With depth 1 or more the
/// stored value variants are checked against the field types. With depth 2
/// or more the members of repeated, map and message fields are checked:
/// fewer than `depth` elements per collection, recursively with depth − 1.
/// Singular message fields recurse at the same depth.
pub struct ReflectionTypeCheck<'a> {
    info: &'a MessageInfo,
}

impl<'a> ReflectionTypeCheck<'a> {
    pub fn new(info: &'a MessageInfo) -> Self {
        Self { info }
    }

    /// Check `message` against the schema down to `depth`.
    ///
    /// # Panics
    ///
    /// Panics when the schema references a message type that is missing
    /// from `registry`.
    pub fn check(&self, registry: &TypeRegistry, message: &DynamicMessage, depth: usize) -> bool {
        if message.type_name() != self.info.type_name() {
            return false;
        }
        if !self.presence(message) {
            return false;
        }
        if depth < 1 {
            return true;
        }
        self.info.fields().iter().all(|field| {
            match message.get(&field.local_name) {
                None => true,
                Some(value) => check_field(registry, field, value, depth),
            }
        })
    }

    fn presence(&self, message: &DynamicMessage) -> bool {
        let mut groups: Vec<(&str, usize)> = Vec::new();
        for field in self.info.fields() {
            let set = message.get(&field.local_name).is_some();
            if let Some(group) = &field.oneof {
                if set {
                    match groups.iter_mut().find(|(g, _)| g == group) {
                        Some((_, n)) => *n += 1,
                        None => groups.push((group, 1)),
                    }
                }
                continue;
            }
            let required = match &field.kind {
                FieldKind::Map { .. } => true,
                _ if field.repeat != Repeat::No => true,
                FieldKind::Scalar { .. } | FieldKind::Enum(_) => !field.opt,
                FieldKind::Message(_) => false,
            };
            if required && !set {
                return false;
            }
        }
        groups.iter().all(|(_, n)| *n <= 1)
    }
}

fn check_field(registry: &TypeRegistry, field: &FieldInfo, value: &Value, depth: usize) -> bool {
    match &field.kind {
        FieldKind::Map { key, value: value_kind } => {
            let Some(map) = value.as_map() else {
                return false;
            };
            if depth < 2 {
                return true;
            }
            if !map
                .keys()
                .take(depth)
                .all(|k| map_key_matches(k, *key))
            {
                return false;
            }
            map.values()
                .take(depth)
                .all(|v| check_member(registry, value_kind, v, depth))
        }
        _ if field.repeat != Repeat::No => {
            let Some(list) = value.as_list() else {
                return false;
            };
            if depth < 2 {
                return true;
            }
            list.iter()
                .take(depth)
                .all(|v| check_element(registry, &field.kind, v, depth))
        }
        FieldKind::Scalar { scalar, .. } => scalar_matches(value, *scalar),
        FieldKind::Enum(_) => matches!(value, Value::Enum(_)),
        FieldKind::Message(type_name) => match value.as_message() {
            Some(sub) => {
                let sub_info = resolve(registry, type_name);
                ReflectionTypeCheck::new(sub_info).check(registry, sub, depth)
            }
            None => false,
        },
    }
}

fn check_element(registry: &TypeRegistry, kind: &FieldKind, value: &Value, depth: usize) -> bool {
    match kind {
        FieldKind::Scalar { scalar, .. } => scalar_matches(value, *scalar),
        FieldKind::Enum(_) => matches!(value, Value::Enum(_)),
        FieldKind::Message(type_name) => match value.as_message() {
            Some(sub) => {
                let sub_info = resolve(registry, type_name);
                ReflectionTypeCheck::new(sub_info).check(registry, sub, depth - 1)
            }
            None => false,
        },
        FieldKind::Map { .. } => false,
    }
}

fn check_member(registry: &TypeRegistry, value_kind: &MapValue, value: &Value, depth: usize) -> bool {
    match value_kind {
        MapValue::Scalar { scalar, .. } => scalar_matches(value, *scalar),
        MapValue::Enum(_) => matches!(value, Value::Enum(_)),
        MapValue::Message(type_name) => match value.as_message() {
            Some(sub) => {
                let sub_info = resolve(registry, type_name);
                ReflectionTypeCheck::new(sub_info).check(registry, sub, depth - 1)
            }
            None => false,
        },
    }
}

fn scalar_matches(value: &Value, scalar: ScalarType) -> bool {
    match scalar {
        ScalarType::Double => matches!(value, Value::F64(v) if !v.is_nan()),
        ScalarType::Float => matches!(value, Value::F32(v) if !v.is_nan()),
        ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => {
            matches!(value, Value::I64(_))
        }
        ScalarType::Uint64 | ScalarType::Fixed64 => matches!(value, Value::U64(_)),
        ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => {
            matches!(value, Value::I32(_))
        }
        ScalarType::Uint32 | ScalarType::Fixed32 => matches!(value, Value::U32(_)),
        ScalarType::Bool => matches!(value, Value::Bool(_)),
        ScalarType::String => matches!(value, Value::String(_)),
        ScalarType::Bytes => matches!(value, Value::Bytes(_)),
    }
}

fn map_key_matches(key: &MapKey, scalar: ScalarType) -> bool {
    match scalar {
        ScalarType::Bool => matches!(key, MapKey::Bool(_)),
        ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => {
            matches!(key, MapKey::I32(_))
        }
        ScalarType::Uint32 | ScalarType::Fixed32 => matches!(key, MapKey::U32(_)),
        ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => {
            matches!(key, MapKey::I64(_))
        }
        ScalarType::Uint64 | ScalarType::Fixed64 => matches!(key, MapKey::U64(_)),
        ScalarType::String => matches!(key, MapKey::String(_)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{EnumInfo, FieldInfo};
    use bytes::Bytes;

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
                    FieldInfo::scalar(2, "data", ScalarType::Bytes),
                    FieldInfo::message(3, "inner", "test.Inner"),
                    FieldInfo::scalar(4, "nums", ScalarType::Int32).repeated(),
                    FieldInfo::enumeration(5, "corpus", corpus),
                    FieldInfo::map(
                        6,
                        "counts",
                        ScalarType::String,
                        MapValue::scalar(ScalarType::Uint32),
                    ),
                    FieldInfo::scalar(7, "text", ScalarType::String).in_oneof("choice"),
                    FieldInfo::scalar(8, "num", ScalarType::Int32).in_oneof("choice"),
                ],
            ))
    }

    fn outer(registry: &TypeRegistry) -> DynamicMessage {
        registry.create("test.Outer").unwrap()
    }

    #[test]
    fn none_and_one_sided_none() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let msg = outer(&registry);
        assert!(reflection_equals(&registry, info, None, None));
        assert!(!reflection_equals(&registry, info, Some(&msg), None));
        assert!(!reflection_equals(&registry, info, None, Some(&msg)));
    }

    #[test]
    fn equal_and_differing_scalars() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let mut a = outer(&registry);
        let mut b = outer(&registry);
        a.set("id", Value::I32(7));
        b.set("id", Value::I32(7));
        assert!(reflection_equals(&registry, info, Some(&a), Some(&b)));
        b.set("id", Value::I32(8));
        assert!(!reflection_equals(&registry, info, Some(&a), Some(&b)));
    }

    #[test]
    fn bytes_compare_by_content() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let mut a = outer(&registry);
        let mut b = outer(&registry);
        a.set("data", Value::Bytes(Bytes::from_static(b"abc")));
        b.set("data", Value::Bytes(Bytes::copy_from_slice(b"abc")));
        assert!(reflection_equals(&registry, info, Some(&a), Some(&b)));
    }

    #[test]
    fn unset_message_differs_from_empty_message() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let mut a = outer(&registry);
        let b = outer(&registry);
        a.set("inner", Value::Message(registry.create("test.Inner").unwrap()));
        assert!(!reflection_equals(&registry, info, Some(&a), Some(&b)));
    }

    #[test]
    fn unknown_fields_do_not_participate() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let mut a = outer(&registry);
        let b = outer(&registry);
        a.push_unknown(crate::UnknownField {
            field_no: 99,
            wire_type: crate::WireType::Varint,
            data: Bytes::from_static(&[0x01]),
        });
        assert!(reflection_equals(&registry, info, Some(&a), Some(&b)));
        assert_ne!(a, b); // structural equality does see them
    }

    #[test]
    fn nested_and_collection_fields() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let mut a = outer(&registry);
        let mut b = outer(&registry);
        let mut inner = registry.create("test.Inner").unwrap();
        inner.set("a", Value::I32(1));
        a.set("inner", Value::Message(inner.clone()));
        b.set("inner", Value::Message(inner));
        a.set("nums", Value::List(vec![Value::I32(1)]));
        b.set("nums", Value::List(vec![Value::I32(1)]));
        assert!(reflection_equals(&registry, info, Some(&a), Some(&b)));

        b.get_mut("inner")
            .and_then(Value::as_message_mut)
            .unwrap()
            .set("a", Value::I32(2));
        assert!(!reflection_equals(&registry, info, Some(&a), Some(&b)));
    }

    #[test]
    fn zeroed_message_passes_all_depths() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let check = ReflectionTypeCheck::new(info);
        let msg = outer(&registry);
        for depth in 0..4 {
            assert!(check.check(&registry, &msg, depth), "depth {depth}");
        }
    }

    #[test]
    fn type_name_mismatch_fails() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let check = ReflectionTypeCheck::new(info);
        let msg = registry.create("test.Inner").unwrap();
        assert!(!check.check(&registry, &msg, 0));
    }

    #[test]
    fn missing_required_entry_fails_depth_zero() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        // an instance built from a narrower schema of the same name
        let narrow = MessageInfo::new(
            "test.Outer",
            vec![FieldInfo::scalar(1, "id", ScalarType::Int32)],
        );
        let msg = DynamicMessage::zeroed(&narrow);
        assert!(!ReflectionTypeCheck::new(info).check(&registry, &msg, 0));
    }

    #[test]
    fn double_oneof_selection_fails_presence() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let mut msg = outer(&registry);
        // plain set bypasses group bookkeeping
        msg.set("text", Value::String("x".into()));
        msg.set("num", Value::I32(1));
        assert!(!ReflectionTypeCheck::new(info).check(&registry, &msg, 0));
    }

    #[test]
    fn wrong_variant_fails_only_from_depth_one() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let check = ReflectionTypeCheck::new(info);
        let mut msg = outer(&registry);
        msg.set("id", Value::String("oops".into()));
        assert!(check.check(&registry, &msg, 0));
        assert!(!check.check(&registry, &msg, 1));
    }

    #[test]
    fn collection_members_checked_from_depth_two() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let check = ReflectionTypeCheck::new(info);
        let mut msg = outer(&registry);
        msg.set(
            "nums",
            Value::List(vec![Value::I32(1), Value::Bool(true)]),
        );
        assert!(check.check(&registry, &msg, 1));
        assert!(!check.check(&registry, &msg, 2));

        // elements past the depth window are not inspected
        msg.set(
            "nums",
            Value::List(vec![Value::I32(1), Value::I32(2), Value::Bool(true)]),
        );
        assert!(check.check(&registry, &msg, 2));
        assert!(!check.check(&registry, &msg, 3));
    }

    #[test]
    fn singular_message_recurses_at_same_depth() {
        let registry = registry();
        let info = registry.message("test.Outer").unwrap();
        let check = ReflectionTypeCheck::new(info);
        let mut msg = outer(&registry);
        let mut inner = registry.create("test.Inner").unwrap();
        inner.set("a", Value::String("oops".into()));
        msg.set("inner", Value::Message(inner));
        assert!(check.check(&registry, &msg, 0));
        assert!(!check.check(&registry, &msg, 1));
    }

    #[test]
    fn nan_fails_float_type_check() {
        let registry = TypeRegistry::new().with_message(MessageInfo::new(
            "test.F",
            vec![FieldInfo::scalar(1, "x", ScalarType::Double)],
        ));
        let info = registry.message("test.F").unwrap();
        let mut msg = registry.create("test.F").unwrap();
        msg.set("x", Value::F64(f64::NAN));
        assert!(!ReflectionTypeCheck::new(info).check(&registry, &msg, 1));
    }
}
