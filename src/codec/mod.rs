//! The message codec: descriptor-driven serialization and deserialization.

mod decode;
mod encode;
pub(crate) mod scalar;

pub use decode::{deserialize, deserialize_into};
pub use encode::{serialize, serialize_into};
