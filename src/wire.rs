//! Tags, wire types, and skipping of unknown fields.

// Discriminant and length casts here are width-checked by construction.
#![allow(clippy::as_conversions)]

use smallvec::SmallVec;

use crate::error::DecodeError;
use crate::varint::Varint;

/// Minimum valid field number.
pub const MIN_FIELD_NUMBER: u32 = 1;
/// Maximum valid field number.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;
/// Field numbers reserved by the wire format, inclusive on both ends.
pub const RESERVED_FIELD_NUMBERS: core::ops::RangeInclusive<u32> = 19_000..=19_999;

/// Deepest message/group nesting the decoder will follow.
pub const MAX_NESTING_DEPTH: u32 = 100;

/// Payload shape of an encoded field.
///
/// Every field on the wire is a tag (field number plus one of these) and a
/// payload whose extent the wire type determines.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer: `int32/64`, `uint32/64`, `sint32/64`,
    /// `bool`, enums.
    Varint = 0,
    /// Eight little-endian bytes: `fixed64`, `sfixed64`, `double`.
    Fixed64 = 1,
    /// Length-prefixed: `string`, `bytes`, submessages, packed repeated.
    LengthDelimited = 2,
    /// Opens a group (deprecated proto2 construct).
    StartGroup = 3,
    /// Closes a group.
    EndGroup = 4,
    /// Four little-endian bytes: `fixed32`, `sfixed32`, `float`.
    Fixed32 = 5,
}

impl WireType {
    /// Validate a raw 3-bit value from a tag.
    #[inline]
    pub fn try_from_raw(raw: u32) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(DecodeError::InvalidTag { raw }),
        }
    }

    /// The raw value carried in a tag's low three bits.
    #[inline]
    pub const fn into_raw(self) -> u8 {
        self as u8
    }
}

/// A field's wire key: `(field_number << 3) | wire_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    field_number: u32,
    wire_type: WireType,
}

impl Tag {
    /// Compose a tag. Debug-asserts the field number is in range; the
    /// registry guarantees this for every descriptor-driven call.
    #[inline]
    pub fn new(wire_type: WireType, field_number: u32) -> Tag {
        debug_assert!(
            (MIN_FIELD_NUMBER..=MAX_FIELD_NUMBER).contains(&field_number),
            "field number {field_number} out of range"
        );
        Tag {
            field_number,
            wire_type,
        }
    }

    /// The tag of a packed repeated field, which is length-delimited
    /// regardless of the element's scalar wire type.
    #[inline]
    pub fn packed(field_number: u32) -> Tag {
        Tag::new(WireType::LengthDelimited, field_number)
    }

    #[inline]
    pub fn field_number(self) -> u32 {
        self.field_number
    }

    #[inline]
    pub fn wire_type(self) -> WireType {
        self.wire_type
    }

    /// Whether the payload is length-prefixed (low three bits equal 2).
    #[inline]
    pub fn is_length_delimited(self) -> bool {
        self.wire_type == WireType::LengthDelimited
    }

    /// The raw varint value this tag encodes to.
    #[inline]
    pub fn raw(self) -> u32 {
        (self.field_number << 3) | u32::from(self.wire_type.into_raw())
    }

    /// Append the tag to `buf` as a varint.
    #[inline]
    pub fn encode<B: bytes::BufMut>(self, buf: &mut B) {
        self.raw().encode_varint(buf);
    }

    /// The encoded width of this tag.
    #[inline]
    pub fn encoded_len(self) -> usize {
        self.raw().varint_len()
    }

    /// Decode a tag from the front of `buf`, validating the wire type and
    /// field-number range.
    #[inline]
    pub fn decode<B: bytes::Buf>(buf: &mut B) -> Result<Tag, DecodeError> {
        let raw = u32::decode_varint(buf)?;
        let wire_type = WireType::try_from_raw(raw & 0b111)?;
        let field_number = raw >> 3;
        if field_number < MIN_FIELD_NUMBER || field_number > MAX_FIELD_NUMBER {
            return Err(DecodeError::InvalidTag { raw });
        }
        Ok(Tag {
            field_number,
            wire_type,
        })
    }
}

/// Decode the length prefix of a length-delimited payload.
#[inline]
pub fn decode_len<B: bytes::Buf>(buf: &mut B) -> Result<usize, DecodeError> {
    let len = u64::decode_varint(buf)?;
    usize::try_from(len).map_err(|_| DecodeError::LengthOverflow { value: len })
}

/// Skip the payload of a field according to its wire type.
///
/// Unknown fields are tolerated by advancing past them: varints by their
/// continuation bits, fixed widths by 4 or 8 bytes, length-delimited
/// payloads by their prefix, and groups by walking nested tags until each
/// START_GROUP is closed by its matching END_GROUP. A bare END_GROUP here
/// means no group is open and fails [`DecodeError::GroupMismatch`] with
/// `started == 0`.
pub fn skip_value<B: bytes::Buf>(
    wire_type: WireType,
    field_number: u32,
    buf: &mut B,
) -> Result<(), DecodeError> {
    let skip = match wire_type {
        WireType::Varint => {
            u64::decode_varint(buf)?;
            return Ok(());
        }
        WireType::Fixed64 => 8,
        WireType::Fixed32 => 4,
        WireType::LengthDelimited => decode_len(buf)?,
        WireType::StartGroup => return skip_group(field_number, buf),
        WireType::EndGroup => {
            return Err(DecodeError::GroupMismatch {
                started: 0,
                ended: field_number,
            })
        }
    };

    if buf.remaining() < skip {
        return Err(DecodeError::truncated(skip, buf.remaining()));
    }
    buf.advance(skip);
    Ok(())
}

/// Skip a group opened by a START_GROUP tag with `start_field`.
///
/// Inner fields are skipped by wire type; nested groups push onto an
/// explicit stack. The group ends when an END_GROUP tag with the matching
/// field number is consumed.
fn skip_group<B: bytes::Buf>(start_field: u32, buf: &mut B) -> Result<(), DecodeError> {
    let mut open: SmallVec<[u32; 8]> = SmallVec::new();
    open.push(start_field);

    while let Some(&expected) = open.last() {
        if !buf.has_remaining() {
            // Buffer ended with the group still open.
            return Err(DecodeError::GroupMismatch {
                started: expected,
                ended: 0,
            });
        }
        let tag = Tag::decode(buf)?;
        match tag.wire_type() {
            WireType::StartGroup => {
                if open.len() as u32 >= MAX_NESTING_DEPTH {
                    return Err(DecodeError::NestingTooDeep {
                        limit: MAX_NESTING_DEPTH,
                    });
                }
                open.push(tag.field_number());
            }
            WireType::EndGroup => {
                if tag.field_number() != expected {
                    return Err(DecodeError::GroupMismatch {
                        started: expected,
                        ended: tag.field_number(),
                    });
                }
                open.pop();
            }
            other => skip_value(other, tag.field_number(), buf)?,
        }
    }
    Ok(())
}
