//! A proto2 runtime: the wire-format codec together with the schema
//! descriptor model it dispatches over.
//!
//! Descriptors are registered once through [`Registry::builder`] and
//! frozen by [`RegistryBuilder::build`]; records of a described message
//! are then serialized and deserialized against the shared registry.
//! Unknown fields survive a decode/encode round trip verbatim, and the
//! deprecated group encoding is fully supported.
//!
//! ```
//! use protolith::descriptor::{FieldDecl, Label, MessageDecl, Parent, ScalarType};
//! use protolith::{deserialize, serialize, Record, Registry};
//!
//! let mut builder = Registry::builder();
//! let file = builder.add_schema("demo.proto", "demo", "proto2");
//! let message = builder.add_message(
//!     Parent::Schema(file),
//!     MessageDecl::new("Measurement")
//!         .field(FieldDecl::scalar("name", 1, Label::Optional, ScalarType::String))
//!         .field(FieldDecl::scalar("samples", 2, Label::Repeated, ScalarType::Uint64).packed()),
//! );
//! let registry = builder.build().unwrap();
//!
//! let mut record = Record::new(&registry, message);
//! record.set(&registry, 1, "tank-4").unwrap();
//! record.push(&registry, 2, 17u64).unwrap();
//!
//! let bytes = serialize(&registry, &record).unwrap();
//! let decoded = deserialize(&registry, message, &bytes).unwrap();
//! assert_eq!(decoded, record);
//! ```

#![deny(clippy::as_conversions)]

pub mod buffer;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod extensions;
pub mod value;
pub mod varint;
pub mod wire;

pub use buffer::EncodeBuffer;
pub use codec::{deserialize, deserialize_into, serialize, serialize_into};
pub use descriptor::{Registry, RegistryBuilder};
pub use error::{DecodeError, DescriptorError, EncodeError};
pub use value::{Record, UnknownField, UnknownFieldSet, Value};
