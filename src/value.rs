//! Dynamic values and record instances of a described message.

// Bit-index arithmetic narrows u32 word indices to usize.
#![allow(clippy::as_conversions)]

use bytes::Bytes;
use smallvec::SmallVec;

use crate::descriptor::{FieldDescriptor, MessageId, Registry};
use crate::error::{ExtensionNotFound, FieldAccessError};
use crate::extensions::ExtensionStore;
use crate::wire::WireType;

/// A single field value, typed by storage width rather than keyword: all
/// of `int32`, `sint32`, and `sfixed32` store as [`Value::I32`], with the
/// field descriptor deciding the wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    /// The symbolic name of an enum value; mapped to its wire index by the
    /// codec.
    Enum(String),
    Message(Box<Record>),
}

impl Value {
    /// Short description of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::I64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::U64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Value {
        Value::Bytes(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Value {
        Value::Message(Box::new(v))
    }
}

/// Storage slot of one field.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum Slot {
    #[default]
    Empty,
    Single(Value),
    Repeated(Vec<Value>),
}

impl Slot {
    pub(crate) fn push(&mut self, value: Value) {
        match self {
            Slot::Repeated(values) => values.push(value),
            _ => *self = Slot::Repeated(vec![value]),
        }
    }
}

/// Compact bit storage for the bool value/presence slots of a record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct BitSet {
    words: SmallVec<[u64; 1]>,
}

impl BitSet {
    fn for_bits(bits: u32) -> BitSet {
        let words = usize::try_from(bits.div_ceil(64)).expect("bit count fits usize");
        BitSet {
            words: SmallVec::from_elem(0, words),
        }
    }

    pub(crate) fn get(&self, index: u32) -> bool {
        let word = (index / 64) as usize;
        self.words[word] & (1 << (index % 64)) != 0
    }

    pub(crate) fn set(&mut self, index: u32, value: bool) {
        let word = (index / 64) as usize;
        let mask = 1u64 << (index % 64);
        if value {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }
}

/// One field found on the wire with no matching descriptor, kept verbatim
/// (tag included) so re-serialization reproduces it byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    pub(crate) number: u32,
    pub(crate) wire_type: WireType,
    pub(crate) bytes: Bytes,
}

impl UnknownField {
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    /// The raw tag-plus-payload bytes as they appeared on the wire.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Unknown fields of a record, in the order they were decoded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnknownFieldSet {
    fields: Vec<UnknownField>,
}

impl UnknownFieldSet {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnknownField> {
        self.fields.iter()
    }

    pub(crate) fn retain_field(&mut self, number: u32, wire_type: WireType, bytes: Bytes) {
        self.fields.push(UnknownField {
            number,
            wire_type,
            bytes,
        });
    }

    pub(crate) fn encode(&self, buf: &mut crate::buffer::EncodeBuffer) {
        for field in &self.fields {
            buf.put_slice(&field.bytes);
        }
    }
}

/// An instance of a described message: one storage slot per field, bit
/// sets for singular bools, retained unknown fields, and the extension
/// side-table.
///
/// Records are created empty by [`Record::new`] or filled by the
/// deserializer, and mutated only through the accessors here.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub(crate) message: MessageId,
    pub(crate) slots: Vec<Slot>,
    pub(crate) bool_values: BitSet,
    pub(crate) bool_present: BitSet,
    pub(crate) unknown: UnknownFieldSet,
    pub(crate) extensions: ExtensionStore,
}

impl Record {
    /// An empty record of the given message: every slot absent.
    pub fn new(registry: &Registry, message: MessageId) -> Record {
        let descriptor = registry.message(message);
        Record {
            message,
            slots: vec![Slot::Empty; descriptor.fields().len()],
            bool_values: BitSet::for_bits(descriptor.bool_slots),
            bool_present: BitSet::for_bits(descriptor.bool_slots),
            unknown: UnknownFieldSet::default(),
            extensions: ExtensionStore::default(),
        }
    }

    /// The message this record instantiates.
    pub fn message_id(&self) -> MessageId {
        self.message
    }

    /// Unknown fields retained by the deserializer.
    pub fn unknown_fields(&self) -> &UnknownFieldSet {
        &self.unknown
    }

    /// Set a singular field, overwriting any existing value.
    pub fn set(
        &mut self,
        registry: &Registry,
        number: u32,
        value: impl Into<Value>,
    ) -> Result<(), FieldAccessError> {
        let (index, field) = self.field(registry, number)?;
        if field.is_repeated() {
            return Err(FieldAccessError::LabelMismatch { number });
        }
        let value = value.into();
        match (field.bool_slot, &value) {
            (Some(slot), Value::Bool(b)) => {
                self.bool_values.set(slot, *b);
                self.bool_present.set(slot, true);
                self.slots[index] = Slot::Empty;
            }
            // A mis-typed value for a bool field lands in the slot and is
            // rejected by the serializer.
            _ => self.slots[index] = Slot::Single(value),
        }
        Ok(())
    }

    /// Append to a repeated field.
    pub fn push(
        &mut self,
        registry: &Registry,
        number: u32,
        value: impl Into<Value>,
    ) -> Result<(), FieldAccessError> {
        let (index, field) = self.field(registry, number)?;
        if !field.is_repeated() {
            return Err(FieldAccessError::LabelMismatch { number });
        }
        self.slots[index].push(value.into());
        Ok(())
    }

    /// The value of a singular field, if set. Declared defaults are not
    /// substituted; an unset field is absent.
    pub fn get(&self, registry: &Registry, number: u32) -> Option<Value> {
        let (index, field) = self.field(registry, number).ok()?;
        if let Some(slot) = field.bool_slot {
            if self.bool_present.get(slot) {
                return Some(Value::Bool(self.bool_values.get(slot)));
            }
        }
        match &self.slots[index] {
            Slot::Single(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The elements of a repeated field; `None` when the number does not
    /// name a repeated field.
    pub fn get_repeated(&self, registry: &Registry, number: u32) -> Option<&[Value]> {
        let (index, field) = self.field(registry, number).ok()?;
        if !field.is_repeated() {
            return None;
        }
        match &self.slots[index] {
            Slot::Repeated(values) => Some(values),
            Slot::Empty => Some(&[]),
            Slot::Single(_) => None,
        }
    }

    /// Whether the field has an explicit value (repeated: any element).
    pub fn has(&self, registry: &Registry, number: u32) -> bool {
        let Ok((index, field)) = self.field(registry, number) else {
            return false;
        };
        if let Some(slot) = field.bool_slot {
            if self.bool_present.get(slot) {
                return true;
            }
        }
        match &self.slots[index] {
            Slot::Empty => false,
            Slot::Single(_) => true,
            Slot::Repeated(values) => !values.is_empty(),
        }
    }

    /// Unset a field.
    pub fn clear(&mut self, registry: &Registry, number: u32) {
        if let Ok((index, field)) = self.field(registry, number) {
            if let Some(slot) = field.bool_slot {
                self.bool_present.set(slot, false);
                self.bool_values.set(slot, false);
            }
            self.slots[index] = Slot::Empty;
        }
    }

    /// Set a singular extension value.
    pub fn set_extension(
        &mut self,
        registry: &Registry,
        number: u32,
        value: impl Into<Value>,
    ) -> Result<(), ExtensionNotFound> {
        self.extension_field(registry, number)?;
        self.extensions.set(number, value.into());
        Ok(())
    }

    /// Append to a repeated extension.
    pub fn push_extension(
        &mut self,
        registry: &Registry,
        number: u32,
        value: impl Into<Value>,
    ) -> Result<(), ExtensionNotFound> {
        self.extension_field(registry, number)?;
        self.extensions.push(number, value.into());
        Ok(())
    }

    /// The value of a singular extension, if set.
    pub fn get_extension(
        &self,
        registry: &Registry,
        number: u32,
    ) -> Result<Option<Value>, ExtensionNotFound> {
        self.extension_field(registry, number)?;
        Ok(match self.extensions.get(number) {
            Some(Slot::Single(value)) => Some(value.clone()),
            _ => None,
        })
    }

    /// Whether the extension has a value. Unlike the other extension
    /// accessors this does not fail on a non-extendable host; it is simply
    /// `false` there.
    pub fn has_extension(&self, registry: &Registry, number: u32) -> bool {
        if self.extension_field(registry, number).is_err() {
            return false;
        }
        self.extensions.has(number)
    }

    /// Unset an extension value.
    pub fn clear_extension(
        &mut self,
        registry: &Registry,
        number: u32,
    ) -> Result<(), ExtensionNotFound> {
        self.extension_field(registry, number)?;
        self.extensions.clear(number);
        Ok(())
    }

    fn field<'r>(
        &self,
        registry: &'r Registry,
        number: u32,
    ) -> Result<(usize, &'r FieldDescriptor), FieldAccessError> {
        let message = registry.message(self.message);
        let index = message
            .index_of(number)
            .ok_or(FieldAccessError::UnknownField { number })?;
        Ok((index, &message.fields()[index]))
    }

    fn extension_field<'r>(
        &self,
        registry: &'r Registry,
        number: u32,
    ) -> Result<&'r FieldDescriptor, ExtensionNotFound> {
        let message = registry.message(self.message);
        if message.extends(number) {
            if let Some(field) = registry.extension(self.message, number) {
                return Ok(field);
            }
        }
        Err(ExtensionNotFound {
            message: message.qualified_name().into(),
            number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        FieldDecl, Label, MessageDecl, MessageId, Parent, Registry, ScalarType,
    };

    fn simple_registry() -> (Registry, MessageId) {
        let mut builder = Registry::builder();
        let file = builder.add_schema("test.proto", "test", "proto2");
        let id = builder.add_message(
            Parent::Schema(file),
            MessageDecl::new("Flags")
                .field(FieldDecl::scalar("a", 1, Label::Optional, ScalarType::Bool))
                .field(FieldDecl::scalar("b", 2, Label::Optional, ScalarType::Bool))
                .field(FieldDecl::scalar("n", 3, Label::Optional, ScalarType::Int32))
                .field(FieldDecl::scalar(
                    "xs",
                    4,
                    Label::Repeated,
                    ScalarType::Int32,
                )),
        );
        (builder.build().unwrap(), id)
    }

    #[test]
    fn bool_fields_share_the_bit_sets() {
        let (registry, id) = simple_registry();
        let mut record = Record::new(&registry, id);

        assert!(!record.has(&registry, 1));
        record.set(&registry, 1, true).unwrap();
        record.set(&registry, 2, false).unwrap();

        // An explicitly-set false is present, not defaulted away.
        assert_eq!(record.get(&registry, 1), Some(Value::Bool(true)));
        assert_eq!(record.get(&registry, 2), Some(Value::Bool(false)));
        assert!(record.has(&registry, 2));

        record.clear(&registry, 1);
        assert!(!record.has(&registry, 1));
        assert_eq!(record.get(&registry, 1), None);
        assert!(record.has(&registry, 2));
    }

    #[test]
    fn arity_is_enforced() {
        let (registry, id) = simple_registry();
        let mut record = Record::new(&registry, id);

        assert_eq!(
            record.set(&registry, 4, 1i32),
            Err(FieldAccessError::LabelMismatch { number: 4 })
        );
        assert_eq!(
            record.push(&registry, 3, 1i32),
            Err(FieldAccessError::LabelMismatch { number: 3 })
        );
        assert_eq!(
            record.set(&registry, 9, 1i32),
            Err(FieldAccessError::UnknownField { number: 9 })
        );
    }

    #[test]
    fn repeated_appends() {
        let (registry, id) = simple_registry();
        let mut record = Record::new(&registry, id);

        assert_eq!(record.get_repeated(&registry, 4), Some(&[][..]));
        record.push(&registry, 4, 7i32).unwrap();
        record.push(&registry, 4, 8i32).unwrap();
        assert_eq!(
            record.get_repeated(&registry, 4),
            Some(&[Value::I32(7), Value::I32(8)][..])
        );
    }

    #[test]
    fn extension_accessors_fail_on_non_extendable_host() {
        let (registry, id) = simple_registry();
        let mut record = Record::new(&registry, id);

        assert!(!record.has_extension(&registry, 100));
        assert!(record.set_extension(&registry, 100, 1i32).is_err());
        assert!(record.get_extension(&registry, 100).is_err());
        assert!(record.clear_extension(&registry, 100).is_err());
    }
}
