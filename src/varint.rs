//! Base-128 varints, the zig-zag mapping, and encoded-length tables.

// Casts in this module are bit-twiddling on reviewed integer widths.
#![allow(clippy::as_conversions)]

use crate::error::DecodeError;

/// Integers with a base-128 variable-length wire encoding.
///
/// Encoding is little-endian base-128 with the high bit of each byte used
/// as a continuation marker. Decoding reads at most
/// [`MAX_VARINT_BYTES`](Varint::MAX_VARINT_BYTES); a continuation bit on
/// the final permitted byte, or payload bits that do not fit the width,
/// fail with [`DecodeError::MalformedVarint`].
pub trait Varint: Sized + Copy {
    /// Widest possible encoding of this integer, in bytes.
    const MAX_VARINT_BYTES: usize;

    /// Append the varint encoding of `self`, returning the bytes written.
    fn encode_varint<B: bytes::BufMut>(self, buf: &mut B) -> usize;

    /// Decode a varint from the front of `buf`, advancing past it.
    fn decode_varint<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError>;

    /// The number of bytes `encode_varint` would write.
    fn varint_len(self) -> usize;
}

impl Varint for u64 {
    const MAX_VARINT_BYTES: usize = 10;

    #[inline]
    fn encode_varint<B: bytes::BufMut>(self, buf: &mut B) -> usize {
        let mut value = self;
        let mut written = 1;
        while value >= 0x80 {
            buf.put_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
            written += 1;
        }
        buf.put_u8(value as u8);
        written
    }

    #[inline]
    fn decode_varint<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let mut value = 0u64;
        for i in 0..Self::MAX_VARINT_BYTES {
            if !buf.has_remaining() {
                return Err(DecodeError::UnexpectedEndOfBuffer);
            }
            let byte = buf.get_u8();
            if i == Self::MAX_VARINT_BYTES - 1 {
                // Tenth byte: only the lowest payload bit fits in the
                // remaining width, and the continuation bit must be clear.
                if byte >= 0x02 {
                    return Err(DecodeError::MalformedVarint);
                }
                return Ok(value | (u64::from(byte) << 63));
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        unreachable!("loop covers every permitted byte")
    }

    /// O(1) length via a table indexed by `leading_zeros()`.
    ///
    /// Index 64 (value 0) maps to 1 byte; index 0 (all bits used) to 10.
    #[inline]
    fn varint_len(self) -> usize {
        #[rustfmt::skip]
        const LZ_TO_LEN: [u8; 65] = [
            10,
            9, 9, 9, 9, 9, 9, 9,
            8, 8, 8, 8, 8, 8, 8,
            7, 7, 7, 7, 7, 7, 7,
            6, 6, 6, 6, 6, 6, 6,
            5, 5, 5, 5, 5, 5, 5,
            4, 4, 4, 4, 4, 4, 4,
            3, 3, 3, 3, 3, 3, 3,
            2, 2, 2, 2, 2, 2, 2,
            1, 1, 1, 1, 1, 1, 1, 1,
        ];
        usize::from(LZ_TO_LEN[self.leading_zeros() as usize])
    }
}

impl Varint for u32 {
    const MAX_VARINT_BYTES: usize = 5;

    #[inline]
    fn encode_varint<B: bytes::BufMut>(self, buf: &mut B) -> usize {
        let mut value = self;
        let mut written = 1;
        while value >= 0x80 {
            buf.put_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
            written += 1;
        }
        buf.put_u8(value as u8);
        written
    }

    #[inline]
    fn decode_varint<B: bytes::Buf>(buf: &mut B) -> Result<Self, DecodeError> {
        let mut value = 0u32;
        for i in 0..Self::MAX_VARINT_BYTES {
            if !buf.has_remaining() {
                return Err(DecodeError::UnexpectedEndOfBuffer);
            }
            let byte = buf.get_u8();
            if i == Self::MAX_VARINT_BYTES - 1 {
                // Fifth byte: four payload bits remain.
                if byte >= 0x10 {
                    return Err(DecodeError::MalformedVarint);
                }
                return Ok(value | (u32::from(byte) << 28));
            }
            value |= u32::from(byte & 0x7f) << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        unreachable!("loop covers every permitted byte")
    }

    #[inline]
    fn varint_len(self) -> usize {
        #[rustfmt::skip]
        const LZ_TO_LEN: [u8; 33] = [
            5, 5, 5, 5,
            4, 4, 4, 4, 4, 4, 4,
            3, 3, 3, 3, 3, 3, 3,
            2, 2, 2, 2, 2, 2, 2,
            1, 1, 1, 1, 1, 1, 1, 1,
        ];
        usize::from(LZ_TO_LEN[self.leading_zeros() as usize])
    }
}

/// Map a signed 32-bit integer onto an unsigned one so small magnitudes of
/// either sign produce short varints.
#[inline]
pub const fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Inverse of [`zigzag_encode32`].
#[inline]
pub const fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ (-((n & 1) as i32))
}

/// Map a signed 64-bit integer onto an unsigned one so small magnitudes of
/// either sign produce short varints.
#[inline]
pub const fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode64`].
#[inline]
pub const fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}
