//! Encoding and decoding of single scalar values, dispatched over the
//! primitive keyword.

// Integer narrowing here implements the wire format's sign-extension and
// truncation rules.
#![allow(clippy::as_conversions)]

use bytes::{Buf, Bytes};

use crate::descriptor::ScalarType;
use crate::error::{DecodeError, EncodeError};
use crate::varint::{
    zigzag_decode32, zigzag_decode64, zigzag_encode32, zigzag_encode64, Varint,
};
use crate::wire::decode_len;

/// Append `value` encoded as `scalar`. The value's variant must match the
/// scalar's storage type; `field` names the field for error reporting.
pub(crate) fn encode_scalar_value<B: bytes::BufMut>(
    scalar: ScalarType,
    value: &crate::value::Value,
    field: &str,
    buf: &mut B,
) -> Result<(), EncodeError> {
    use crate::value::Value;

    let mismatch = || EncodeError::value_type_mismatch(field, scalar.keyword());
    match (scalar, value) {
        (ScalarType::Int32, Value::I32(v)) => {
            // Negative int32 sign-extends through 64 bits: ten wire bytes.
            ((*v as i64) as u64).encode_varint(buf);
        }
        (ScalarType::Int64, Value::I64(v)) => {
            (*v as u64).encode_varint(buf);
        }
        (ScalarType::Uint32, Value::U32(v)) => {
            v.encode_varint(buf);
        }
        (ScalarType::Uint64, Value::U64(v)) => {
            v.encode_varint(buf);
        }
        (ScalarType::Sint32, Value::I32(v)) => {
            zigzag_encode32(*v).encode_varint(buf);
        }
        (ScalarType::Sint64, Value::I64(v)) => {
            zigzag_encode64(*v).encode_varint(buf);
        }
        (ScalarType::Bool, Value::Bool(v)) => {
            buf.put_u8(*v as u8);
        }
        (ScalarType::Fixed32, Value::U32(v)) => {
            buf.put_u32_le(*v);
        }
        (ScalarType::Sfixed32, Value::I32(v)) => {
            buf.put_i32_le(*v);
        }
        (ScalarType::Float, Value::F32(v)) => {
            buf.put_f32_le(*v);
        }
        (ScalarType::Fixed64, Value::U64(v)) => {
            buf.put_u64_le(*v);
        }
        (ScalarType::Sfixed64, Value::I64(v)) => {
            buf.put_i64_le(*v);
        }
        (ScalarType::Double, Value::F64(v)) => {
            buf.put_f64_le(*v);
        }
        (ScalarType::String, Value::String(v)) => {
            (v.len() as u64).encode_varint(buf);
            buf.put_slice(v.as_bytes());
        }
        (ScalarType::Bytes, Value::Bytes(v)) => {
            (v.len() as u64).encode_varint(buf);
            buf.put_slice(v);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// The number of bytes [`encode_scalar_value`] would write.
pub(crate) fn scalar_value_len(
    scalar: ScalarType,
    value: &crate::value::Value,
    field: &str,
) -> Result<usize, EncodeError> {
    use crate::value::Value;

    let mismatch = || EncodeError::value_type_mismatch(field, scalar.keyword());
    let len = match (scalar, value) {
        (ScalarType::Int32, Value::I32(v)) => ((*v as i64) as u64).varint_len(),
        (ScalarType::Int64, Value::I64(v)) => (*v as u64).varint_len(),
        (ScalarType::Uint32, Value::U32(v)) => v.varint_len(),
        (ScalarType::Uint64, Value::U64(v)) => v.varint_len(),
        (ScalarType::Sint32, Value::I32(v)) => zigzag_encode32(*v).varint_len(),
        (ScalarType::Sint64, Value::I64(v)) => zigzag_encode64(*v).varint_len(),
        (ScalarType::Bool, Value::Bool(_)) => 1,
        (ScalarType::Fixed32, Value::U32(_)) => 4,
        (ScalarType::Sfixed32, Value::I32(_)) => 4,
        (ScalarType::Float, Value::F32(_)) => 4,
        (ScalarType::Fixed64, Value::U64(_)) => 8,
        (ScalarType::Sfixed64, Value::I64(_)) => 8,
        (ScalarType::Double, Value::F64(_)) => 8,
        (ScalarType::String, Value::String(v)) => (v.len() as u64).varint_len() + v.len(),
        (ScalarType::Bytes, Value::Bytes(v)) => (v.len() as u64).varint_len() + v.len(),
        _ => return Err(mismatch()),
    };
    Ok(len)
}

/// Sum of the encoded element sizes of a packed repeated payload, used to
/// emit the length prefix before the elements.
pub(crate) fn packed_payload_len(
    scalar: ScalarType,
    values: &[crate::value::Value],
    field: &str,
) -> Result<usize, EncodeError> {
    let mut total = 0;
    for value in values {
        total += scalar_value_len(scalar, value, field)?;
    }
    Ok(total)
}

/// Decode one value of `scalar` from the front of `buf`.
pub(crate) fn decode_scalar_value(
    scalar: ScalarType,
    field_number: u32,
    buf: &mut &[u8],
) -> Result<crate::value::Value, DecodeError> {
    use crate::value::Value;

    let value = match scalar {
        // Varint family: decoded at full width, then narrowed with the
        // keyword's truncation/sign-extension rule.
        ScalarType::Int32 => Value::I32(u64::decode_varint(buf)? as i32),
        ScalarType::Int64 => Value::I64(u64::decode_varint(buf)? as i64),
        ScalarType::Uint32 => Value::U32(u64::decode_varint(buf)? as u32),
        ScalarType::Uint64 => Value::U64(u64::decode_varint(buf)?),
        ScalarType::Sint32 => Value::I32(zigzag_decode32(u64::decode_varint(buf)? as u32)),
        ScalarType::Sint64 => Value::I64(zigzag_decode64(u64::decode_varint(buf)?)),
        ScalarType::Bool => Value::Bool(u64::decode_varint(buf)? != 0),
        ScalarType::Fixed32 => Value::U32(get_fixed(buf, 4)?.get_u32_le()),
        ScalarType::Sfixed32 => Value::I32(get_fixed(buf, 4)?.get_i32_le()),
        ScalarType::Float => Value::F32(get_fixed(buf, 4)?.get_f32_le()),
        ScalarType::Fixed64 => Value::U64(get_fixed(buf, 8)?.get_u64_le()),
        ScalarType::Sfixed64 => Value::I64(get_fixed(buf, 8)?.get_i64_le()),
        ScalarType::Double => Value::F64(get_fixed(buf, 8)?.get_f64_le()),
        ScalarType::String => {
            let payload = take_delimited(buf)?;
            let text = core::str::from_utf8(payload)
                .map_err(|_| DecodeError::InvalidUtf8 { field_number })?;
            Value::String(text.to_owned())
        }
        ScalarType::Bytes => {
            let payload = take_delimited(buf)?;
            Value::Bytes(Bytes::copy_from_slice(payload))
        }
    };
    Ok(value)
}

#[inline]
fn get_fixed<'a>(buf: &mut &'a [u8], width: usize) -> Result<&'a [u8], DecodeError> {
    if buf.len() < width {
        return Err(DecodeError::UnexpectedEndOfBuffer);
    }
    let (head, rest) = buf.split_at(width);
    *buf = rest;
    Ok(head)
}

#[inline]
fn take_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let len = decode_len(buf)?;
    if buf.len() < len {
        return Err(DecodeError::truncated(len, buf.len()));
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[track_caller]
    fn roundtrip(scalar: ScalarType, value: Value) {
        let mut buf = Vec::new();
        encode_scalar_value(scalar, &value, "f", &mut buf).unwrap();
        assert_eq!(buf.len(), scalar_value_len(scalar, &value, "f").unwrap());

        let mut slice = &buf[..];
        let decoded = decode_scalar_value(scalar, 1, &mut slice).unwrap();
        assert!(slice.is_empty(), "{} bytes left over", slice.len());
        assert_eq!(decoded, value);
    }

    #[test]
    fn varint_family_roundtrips() {
        roundtrip(ScalarType::Int32, Value::I32(0));
        roundtrip(ScalarType::Int32, Value::I32(-1));
        roundtrip(ScalarType::Int32, Value::I32(i32::MIN));
        roundtrip(ScalarType::Int64, Value::I64(i64::MIN));
        roundtrip(ScalarType::Uint32, Value::U32(u32::MAX));
        roundtrip(ScalarType::Uint64, Value::U64(u64::MAX));
        roundtrip(ScalarType::Sint32, Value::I32(-12345));
        roundtrip(ScalarType::Sint64, Value::I64(i64::MIN));
        roundtrip(ScalarType::Bool, Value::Bool(true));
    }

    #[test]
    fn negative_int32_takes_ten_bytes() {
        let mut buf = Vec::new();
        encode_scalar_value(ScalarType::Int32, &Value::I32(-10), "f", &mut buf).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(
            scalar_value_len(ScalarType::Int32, &Value::I32(-10), "f").unwrap(),
            10
        );
    }

    #[test]
    fn fixed_and_float_roundtrips() {
        roundtrip(ScalarType::Fixed32, Value::U32(0xDEAD_BEEF));
        roundtrip(ScalarType::Sfixed32, Value::I32(i32::MIN));
        roundtrip(ScalarType::Fixed64, Value::U64(u64::MAX));
        roundtrip(ScalarType::Sfixed64, Value::I64(i64::MIN));
        roundtrip(ScalarType::Float, Value::F32(core::f32::consts::PI));
        roundtrip(ScalarType::Double, Value::F64(-0.0));
    }

    #[test]
    fn string_and_bytes_roundtrips() {
        roundtrip(ScalarType::String, Value::String(String::new()));
        roundtrip(ScalarType::String, Value::String("snail🐌".to_owned()));
        roundtrip(ScalarType::Bytes, Value::Bytes(Bytes::from_static(b"\x00\xff")));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        // len 2, then bytes that are not UTF-8
        let buf: &[u8] = &[2, 0xC3, 0x28];
        let mut slice = buf;
        assert_eq!(
            decode_scalar_value(ScalarType::String, 7, &mut slice),
            Err(DecodeError::InvalidUtf8 { field_number: 7 })
        );
    }

    #[test]
    fn bool_accepts_any_nonzero_varint() {
        let buf: &[u8] = &[0x80, 0x02];
        let mut slice = buf;
        assert_eq!(
            decode_scalar_value(ScalarType::Bool, 1, &mut slice).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn value_variant_must_match_keyword() {
        let mut buf = Vec::new();
        assert!(matches!(
            encode_scalar_value(ScalarType::Int32, &Value::U32(1), "f", &mut buf),
            Err(EncodeError::ValueTypeMismatch { .. })
        ));
        assert!(scalar_value_len(ScalarType::String, &Value::Bytes(Bytes::new()), "f").is_err());
    }
}
