//! Descriptor-driven record serialization.

// Bool-to-byte and sign-extension casts implement the wire format rules.
#![allow(clippy::as_conversions)]

use crate::buffer::EncodeBuffer;
use crate::codec::scalar::{encode_scalar_value, packed_payload_len};
use crate::descriptor::{FieldDescriptor, FieldType, Label, MessageDescriptor, Registry};
use crate::error::EncodeError;
use crate::value::{Record, Slot, Value};
use crate::varint::Varint;
use crate::wire::{Tag, WireType};

/// Serialize a record to a fresh byte vector.
pub fn serialize(registry: &Registry, record: &Record) -> Result<Vec<u8>, EncodeError> {
    let mut buf = EncodeBuffer::new();
    serialize_into(registry, record, &mut buf)?;
    Ok(buf.into_bytes())
}

/// Serialize a record onto the end of `buf`, returning the bytes written.
///
/// On error the buffer is left with a partial prefix of the record; the
/// caller discards it.
pub fn serialize_into(
    registry: &Registry,
    record: &Record,
    buf: &mut EncodeBuffer,
) -> Result<usize, EncodeError> {
    let start = buf.len();
    encode_record(registry, record, buf)?;
    Ok(buf.len() - start)
}

/// Emit every present field in ascending field-number order, extensions
/// interleaved, then the retained unknown fields verbatim.
pub(crate) fn encode_record(
    registry: &Registry,
    record: &Record,
    buf: &mut EncodeBuffer,
) -> Result<(), EncodeError> {
    let message = registry.message(record.message);

    let mut extensions = record.extensions.iter().peekable();
    for &field_index in &message.emit_order {
        let field = &message.fields()[usize::from(field_index)];
        while let Some(&(number, slot)) = extensions.peek() {
            if number >= field.number() {
                break;
            }
            encode_extension(registry, record, number, slot, buf)?;
            extensions.next();
        }
        encode_field(registry, message, record, field, usize::from(field_index), buf)?;
    }
    for (number, slot) in extensions {
        encode_extension(registry, record, number, slot, buf)?;
    }

    record.unknown.encode(buf);
    Ok(())
}

fn encode_field(
    registry: &Registry,
    message: &MessageDescriptor,
    record: &Record,
    field: &FieldDescriptor,
    index: usize,
    buf: &mut EncodeBuffer,
) -> Result<(), EncodeError> {
    // Singular bools live in the record's bit sets.
    if let Some(bool_slot) = field.bool_slot {
        if record.bool_present.get(bool_slot) {
            Tag::new(WireType::Varint, field.number()).encode(buf);
            buf.put_u8(record.bool_values.get(bool_slot) as u8);
            return Ok(());
        }
    }

    match (field.label(), &record.slots[index]) {
        (Label::Optional, Slot::Empty) => Ok(()),
        (Label::Required, Slot::Empty) => Err(EncodeError::MissingRequired {
            message: message.qualified_name().into(),
            field: field.name().into(),
        }),
        (Label::Repeated, Slot::Empty) => Ok(()),
        (Label::Repeated, Slot::Repeated(values)) => {
            encode_repeated(registry, field, values, buf)
        }
        (Label::Optional | Label::Required, Slot::Single(value)) => {
            encode_singular(registry, field, value, buf)
        }
        // Arity of the slot contradicts the label; the accessors never
        // produce this, but a hand-built record could.
        (Label::Repeated, Slot::Single(_)) => Err(EncodeError::value_type_mismatch(
            field.name(),
            "repeated",
        )),
        (Label::Optional | Label::Required, Slot::Repeated(_)) => Err(
            EncodeError::value_type_mismatch(field.name(), "singular"),
        ),
    }
}

fn encode_repeated(
    registry: &Registry,
    field: &FieldDescriptor,
    values: &[Value],
    buf: &mut EncodeBuffer,
) -> Result<(), EncodeError> {
    if values.is_empty() {
        return Ok(());
    }

    if let FieldType::Scalar(scalar) = field.field_type() {
        if field.is_packed() && scalar.is_packable() {
            // Two passes: size the payload, emit the prefix, then the
            // elements with no per-element tags.
            let payload_len = packed_payload_len(scalar, values, field.name())?;
            Tag::packed(field.number()).encode(buf);
            (payload_len as u64).encode_varint(buf);

            let start = buf.len();
            for value in values {
                encode_scalar_value(scalar, value, field.name(), buf)?;
            }
            debug_assert_eq!(buf.len() - start, payload_len, "packed size drifted");
            return Ok(());
        }
    }

    for value in values {
        encode_singular(registry, field, value, buf)?;
    }
    Ok(())
}

fn encode_singular(
    registry: &Registry,
    field: &FieldDescriptor,
    value: &Value,
    buf: &mut EncodeBuffer,
) -> Result<(), EncodeError> {
    let number = field.number();
    match field.field_type() {
        FieldType::Scalar(scalar) => {
            Tag::new(scalar.wire_type(), number).encode(buf);
            encode_scalar_value(scalar, value, field.name(), buf)
        }
        FieldType::Message(expected) => {
            let sub = expect_record(field, value, expected)?;
            Tag::new(WireType::LengthDelimited, number).encode(buf);
            let mark = buf.begin_len_prefix();
            encode_record(registry, sub, buf)?;
            buf.end_len_prefix(mark);
            Ok(())
        }
        FieldType::Group(expected) => {
            let sub = expect_record(field, value, expected)?;
            Tag::new(WireType::StartGroup, number).encode(buf);
            encode_record(registry, sub, buf)?;
            Tag::new(WireType::EndGroup, number).encode(buf);
            Ok(())
        }
        FieldType::Enum(enum_id) => {
            let Value::Enum(symbol) = value else {
                return Err(EncodeError::value_type_mismatch(field.name(), "enum"));
            };
            let index = match registry.enum_wire_index(enum_id, symbol) {
                Some(index) => index,
                // Open enums tolerate symbols from a newer schema.
                None if registry.enum_descriptor(enum_id).is_open() => 0,
                None => {
                    return Err(EncodeError::UnknownEnumValue {
                        enum_name: registry.enum_descriptor(enum_id).qualified_name().into(),
                        value: symbol.as_str().into(),
                    })
                }
            };
            Tag::new(WireType::Varint, number).encode(buf);
            // Enum indices travel as int32.
            ((index as i64) as u64).encode_varint(buf);
            Ok(())
        }
        FieldType::Alias(alias_id) => {
            let alias = registry.alias(alias_id);
            let wire_value =
                alias
                    .encode_value(value)
                    .map_err(|reason| EncodeError::AliasFailed {
                        alias: alias.name().into(),
                        reason: reason.into(),
                    })?;
            Tag::new(alias.wire_scalar().wire_type(), number).encode(buf);
            encode_scalar_value(alias.wire_scalar(), &wire_value, field.name(), buf)
        }
    }
}

fn expect_record<'v>(
    field: &FieldDescriptor,
    value: &'v Value,
    expected: crate::descriptor::MessageId,
) -> Result<&'v Record, EncodeError> {
    match value {
        Value::Message(sub) if sub.message_id() == expected => Ok(sub),
        _ => Err(EncodeError::value_type_mismatch(field.name(), "message")),
    }
}

fn encode_extension(
    registry: &Registry,
    record: &Record,
    number: u32,
    slot: &Slot,
    buf: &mut EncodeBuffer,
) -> Result<(), EncodeError> {
    // The store only admits values for registered extensions.
    let Some(field) = registry.extension(record.message, number) else {
        debug_assert!(false, "stored extension {number} has no descriptor");
        return Ok(());
    };
    match slot {
        Slot::Empty => Ok(()),
        Slot::Single(value) => encode_singular(registry, field, value, buf),
        Slot::Repeated(values) => encode_repeated(registry, field, values, buf),
    }
}
