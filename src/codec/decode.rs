//! Descriptor-driven record deserialization.

// Varint narrowing implements the wire format's truncation rules.
#![allow(clippy::as_conversions)]

use bytes::Bytes;

use crate::codec::scalar::decode_scalar_value;
use crate::descriptor::{FieldDescriptor, FieldType, MessageId, Registry};
use crate::error::DecodeError;
use crate::value::{Record, Slot, Value};
use crate::varint::Varint;
use crate::wire::{decode_len, skip_value, Tag, WireType, MAX_NESTING_DEPTH};

/// Decode a record of `message` from `bytes`, consuming the whole buffer.
pub fn deserialize(
    registry: &Registry,
    message: MessageId,
    bytes: &[u8],
) -> Result<Record, DecodeError> {
    let mut record = Record::new(registry, message);
    deserialize_into(registry, message, bytes, &mut record)?;
    Ok(record)
}

/// Decode `bytes` into an existing record, merging with proto2 semantics:
/// singular fields overwrite, repeated fields append.
pub fn deserialize_into(
    registry: &Registry,
    message: MessageId,
    bytes: &[u8],
    record: &mut Record,
) -> Result<(), DecodeError> {
    debug_assert_eq!(record.message_id(), message, "record of the wrong message");
    let mut buf = bytes;
    decode_record(registry, &mut buf, record, None, 0)
}

/// What a known field's payload decoded to.
enum Payload {
    Single(Value),
    Packed(Vec<Value>),
    /// An enum index with no symbolic value; the caller retains the raw
    /// bytes instead of assigning.
    UnknownEnum,
}

/// The tag-dispatch loop for one message region.
///
/// `group_end` is the field number whose END_GROUP tag terminates this
/// region; `None` means the region runs to the end of the buffer.
fn decode_record(
    registry: &Registry,
    buf: &mut &[u8],
    record: &mut Record,
    group_end: Option<u32>,
    depth: u32,
) -> Result<(), DecodeError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(DecodeError::NestingTooDeep {
            limit: MAX_NESTING_DEPTH,
        });
    }
    let message = registry.message(record.message);

    loop {
        if buf.is_empty() {
            match group_end {
                None => break,
                Some(started) => {
                    return Err(DecodeError::GroupMismatch { started, ended: 0 })
                }
            }
        }

        // Snapshot before the tag so unknown fields can be kept verbatim.
        let checkpoint = *buf;
        let tag = Tag::decode(buf)?;
        let number = tag.field_number();

        if tag.wire_type() == WireType::EndGroup {
            return match group_end {
                Some(started) if started == number => {
                    check_required(message, record)?;
                    Ok(())
                }
                Some(started) => Err(DecodeError::GroupMismatch {
                    started,
                    ended: number,
                }),
                None => Err(DecodeError::GroupMismatch {
                    started: 0,
                    ended: number,
                }),
            };
        }

        if let Some(index) = message.index_of(number) {
            let field = &message.fields()[index];
            match decode_payload(registry, field, tag, buf, depth)? {
                Payload::Single(value) => assign(record, field, index, value),
                Payload::Packed(values) => {
                    for value in values {
                        record.slots[index].push(value);
                    }
                }
                Payload::UnknownEnum => retain(record, tag, checkpoint, buf),
            }
        } else if let Some(extension) = registry.extension(record.message, number) {
            match decode_payload(registry, extension, tag, buf, depth)? {
                Payload::Single(value) => {
                    if extension.is_repeated() {
                        record.extensions.push(number, value);
                    } else {
                        record.extensions.set(number, value);
                    }
                }
                Payload::Packed(values) => {
                    for value in values {
                        record.extensions.push(number, value);
                    }
                }
                Payload::UnknownEnum => retain(record, tag, checkpoint, buf),
            }
        } else {
            skip_value(tag.wire_type(), number, buf)?;
            retain(record, tag, checkpoint, buf);
        }
    }

    check_required(message, record)?;
    Ok(())
}

/// Decode the payload of a known field, validating the wire type against
/// the descriptor. One mismatch is tolerated by design: a length-delimited
/// payload for a repeated scalar is the packed encoding.
fn decode_payload(
    registry: &Registry,
    field: &FieldDescriptor,
    tag: Tag,
    buf: &mut &[u8],
    depth: u32,
) -> Result<Payload, DecodeError> {
    let number = tag.field_number();
    let actual = tag.wire_type();
    let expected = field.wire_type(registry);
    let mismatch = || DecodeError::wire_type_mismatch(number, expected, actual);

    match field.field_type() {
        FieldType::Scalar(scalar) => {
            if actual == expected {
                Ok(Payload::Single(decode_scalar_value(scalar, number, buf)?))
            } else if actual == WireType::LengthDelimited
                && field.is_repeated()
                && scalar.is_packable()
            {
                decode_packed(scalar, number, buf)
            } else {
                Err(mismatch())
            }
        }
        FieldType::Message(sub_message) => {
            if actual != WireType::LengthDelimited {
                return Err(mismatch());
            }
            let len = decode_len(buf)?;
            if buf.len() < len {
                return Err(DecodeError::truncated(len, buf.len()));
            }
            let (mut region, rest) = buf.split_at(len);
            *buf = rest;

            let mut sub = Record::new(registry, sub_message);
            decode_record(registry, &mut region, &mut sub, None, depth + 1)?;
            // The bounded loop runs the region dry before returning.
            debug_assert!(region.is_empty());
            Ok(Payload::Single(Value::Message(Box::new(sub))))
        }
        FieldType::Group(sub_message) => {
            if actual != WireType::StartGroup {
                return Err(mismatch());
            }
            let mut sub = Record::new(registry, sub_message);
            decode_record(registry, buf, &mut sub, Some(number), depth + 1)?;
            Ok(Payload::Single(Value::Message(Box::new(sub))))
        }
        FieldType::Enum(enum_id) => {
            if actual != WireType::Varint {
                return Err(mismatch());
            }
            let index = u64::decode_varint(buf)? as i32;
            match registry.enum_symbol(enum_id, index) {
                Some(symbol) => Ok(Payload::Single(Value::Enum(symbol.to_owned()))),
                // A wire index from a newer schema: the field stays absent
                // and the bytes ride along in the unknown set.
                None => Ok(Payload::UnknownEnum),
            }
        }
        FieldType::Alias(alias_id) => {
            let alias = registry.alias(alias_id);
            if actual != alias.wire_scalar().wire_type() {
                return Err(mismatch());
            }
            let wire_value = decode_scalar_value(alias.wire_scalar(), number, buf)?;
            alias
                .decode_value(wire_value)
                .map(Payload::Single)
                .map_err(|reason| DecodeError::AliasFailed {
                    alias: alias.name().into(),
                    reason: reason.into(),
                })
        }
    }
}

fn decode_packed(
    scalar: crate::descriptor::ScalarType,
    number: u32,
    buf: &mut &[u8],
) -> Result<Payload, DecodeError> {
    let len = decode_len(buf)?;
    if buf.len() < len {
        return Err(DecodeError::truncated(len, buf.len()));
    }
    if let Some(width) = scalar.fixed_width() {
        if len % usize::from(width) != 0 {
            return Err(DecodeError::InvalidPackedLength {
                element_size: width,
                actual: len,
            });
        }
    }
    let (mut region, rest) = buf.split_at(len);
    *buf = rest;

    let mut values = Vec::new();
    while !region.is_empty() {
        values.push(decode_scalar_value(scalar, number, &mut region)?);
    }
    Ok(Payload::Packed(values))
}

/// Keep the wire bytes of a field, tag included, for verbatim re-emission.
fn retain(record: &mut Record, tag: Tag, checkpoint: &[u8], buf: &&[u8]) {
    let consumed = checkpoint.len() - buf.len();
    record.unknown.retain_field(
        tag.field_number(),
        tag.wire_type(),
        Bytes::copy_from_slice(&checkpoint[..consumed]),
    );
}

fn assign(record: &mut Record, field: &FieldDescriptor, index: usize, value: Value) {
    if field.is_repeated() {
        record.slots[index].push(value);
        return;
    }
    // Duplicated singular fields: last one wins.
    if let (Some(bool_slot), Value::Bool(b)) = (field.bool_slot, &value) {
        record.bool_values.set(bool_slot, *b);
        record.bool_present.set(bool_slot, true);
        return;
    }
    record.slots[index] = Slot::Single(value);
}

fn check_required(
    message: &crate::descriptor::MessageDescriptor,
    record: &Record,
) -> Result<(), DecodeError> {
    for &index in &message.required {
        let field = &message.fields()[usize::from(index)];
        let present = match field.bool_slot {
            Some(bool_slot) => record.bool_present.get(bool_slot),
            None => !matches!(record.slots[usize::from(index)], Slot::Empty),
        };
        if !present {
            return Err(DecodeError::missing_required(field.name()));
        }
    }
    Ok(())
}
