//! Message schema registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::MessageInfo;
use crate::error::DecodeError;
use crate::value::DynamicMessage;

/// Immutable collection of message schemas, keyed by fully-qualified type
/// name.
///
/// Message fields reference their value type by name, so a registry used to
/// decode or encode must contain every message type reachable from the root
/// type. A missing type surfaces as [`DecodeError::UnknownType`] or
/// [`crate::EncodeError::UnknownType`] when the codec first dereferences it.
///
/// Registries are cheap to clone and are shared by reference; there is no
/// global schema cache.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    messages: HashMap<String, Arc<MessageInfo>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message schema, replacing any earlier entry of the same name.
    pub fn with_message(mut self, info: MessageInfo) -> Self {
        self.messages
            .insert(info.type_name().to_owned(), Arc::new(info));
        self
    }

    /// Schema for `type_name`, if registered.
    pub fn message(&self, type_name: &str) -> Option<&MessageInfo> {
        self.messages.get(type_name).map(Arc::as_ref)
    }

    /// Create a zeroed instance of `type_name`.
    pub fn create(&self, type_name: &str) -> Result<DynamicMessage, DecodeError> {
        let info = self
            .message(type_name)
            .ok_or_else(|| DecodeError::UnknownType(type_name.to_owned()))?;
        Ok(DynamicMessage::zeroed(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldInfo, ScalarType};

    #[test]
    fn lookup_and_create() {
        let registry = TypeRegistry::new().with_message(MessageInfo::new(
            "test.Item",
            vec![FieldInfo::scalar(1, "id", ScalarType::Int32)],
        ));
        assert!(registry.message("test.Item").is_some());
        assert!(registry.message("test.Other").is_none());

        let msg = registry.create("test.Item").unwrap();
        assert_eq!(msg.type_name(), "test.Item");
        assert!(matches!(
            registry.create("test.Other"),
            Err(DecodeError::UnknownType(_))
        ));
    }
}
