//! Reflection-driven Protocol Buffers binary codec.
//!
//! This crate implements the protobuf binary wire format without generated
//! per-message code. Messages are held as [`DynamicMessage`] values, and a
//! schema — [`MessageInfo`] field tables, [`EnumInfo`] value tables,
//! resolved through a [`TypeRegistry`] — drives every encode and decode.
//!
//! ## Modules
//!
//! - [`wire`]: tags, varints and zigzag primitives
//! - [`reader`] / [`writer`]: byte-level cursors over wire data
//! - [`descriptor`] / [`registry`]: schema tables
//! - [`value`]: the dynamic message model
//! - [`decode`] / [`encode`]: the reflection codec
//! - [`compare`]: schema-driven equality and shape validation
//!
//! ## Example
//!
//! ```
//! use pbweb_runtime::{
//!     DecodeOptions, EncodeOptions, FieldInfo, MessageInfo, ScalarType, TypeRegistry, Value,
//!     decode, encode,
//! };
//!
//! let registry = TypeRegistry::new().with_message(MessageInfo::new(
//!     "shop.Order",
//!     vec![
//!         FieldInfo::scalar(1, "id", ScalarType::Int32),
//!         FieldInfo::scalar(2, "note", ScalarType::String),
//!     ],
//! ));
//!
//! let mut order = registry.create("shop.Order")?;
//! order.set("id", Value::I32(150));
//! let bytes = encode(&registry, &order, EncodeOptions::default())?;
//! assert_eq!(bytes, [0x08, 0x96, 0x01]);
//!
//! let back = decode(&registry, "shop.Order", &bytes, DecodeOptions::default())?;
//! assert_eq!(back, order);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compare;
pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod reader;
pub mod registry;
pub mod unknown;
pub mod value;
pub mod wire;
pub mod writer;

pub use compare::{ReflectionTypeCheck, reflection_equals};
pub use decode::{DecodeOptions, decode, merge_from};
pub use descriptor::{
    EnumInfo, FieldInfo, FieldKind, LongRepr, MAX_SAFE_NUMBER, MapValue, MessageInfo, Repeat,
    ScalarType,
};
pub use encode::{EncodeOptions, encode, encode_into};
pub use error::{DecodeError, EncodeError};
pub use reader::BinaryReader;
pub use registry::TypeRegistry;
pub use unknown::{UnknownField, UnknownFieldPolicy};
pub use value::{DynamicMessage, MapKey, Value};
pub use wire::WireType;
pub use writer::BinaryWriter;
