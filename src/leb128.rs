//! LEB128 variable-length integer encoding/decoding, plus ZigZag.
//!
//! Protobuf varints are little-endian base-128: each byte carries 7 bits of
//! payload and the most significant bit signals that another byte follows.

// This module uses `as` casts which have been thoroughly reviewed for correctness.
#![allow(clippy::as_conversions)]

use crate::error::Error;
use crate::util::{likely, unlikely};

/// Maximum number of bytes a 64-bit varint can occupy on the wire.
pub const MAX_VARINT_LEN: usize = 10;

/// Maximum number of bytes a 32-bit varint can occupy on the wire.
pub const MAX_VARINT32_LEN: usize = 5;

const CONTINUATION: u8 = 0x80;

/// Types that can be encoded as a LEB128 integer.
pub trait LebCodec: Sized + Copy {
    /// Maximum number of bytes the encoding of this type can take.
    const MAX_LEB_BYTES: usize;

    /// Encode `self` as a LEB128 variable length integer into the provided
    /// buffer, returning how many bytes were written.
    ///
    /// The encoding is always minimal, 0 is a single `0x00` byte.
    fn encode_leb128<B: bytes::BufMut>(self, buf: &mut B) -> usize;

    /// The number of bytes required to encode this integer.
    fn encoded_leb128_len(self) -> usize;
}

impl LebCodec for u64 {
    const MAX_LEB_BYTES: usize = MAX_VARINT_LEN;

    #[inline]
    fn encode_leb128<B: bytes::BufMut>(self, buf: &mut B) -> usize {
        let mut scratch = [0u8; MAX_VARINT_LEN];
        let len = encode_varint_to_array(self, &mut scratch);
        buf.put_slice(&scratch[..len]);
        len
    }

    /// Compute the LEB128 encoded length from the number of significant bits.
    ///
    /// Every 7 bits need a byte, with a minimum of 1 byte for value 0. The
    /// expression below is `ceil(bits / 7)` without a division: multiplying
    /// by 9 and dividing by 64 is exact for every `bits` in `0..=64`.
    #[inline]
    fn encoded_leb128_len(self) -> usize {
        let bits = 64 - (self | 1).leading_zeros();
        ((bits * 9 + 64) / 64) as usize
    }
}

impl LebCodec for u32 {
    const MAX_LEB_BYTES: usize = MAX_VARINT32_LEN;

    #[inline]
    fn encode_leb128<B: bytes::BufMut>(self, buf: &mut B) -> usize {
        u64::from(self).encode_leb128(buf)
    }

    #[inline]
    fn encoded_leb128_len(self) -> usize {
        u64::from(self).encoded_leb128_len()
    }
}

/// Encode `value` into `out`, returning the number of bytes used.
///
/// Writing into a fixed array first lets encoders emit a varint with a single
/// bounds check, which matters for the fixed-size and buffered encoders.
#[inline]
pub fn encode_varint_to_array(mut value: u64, out: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut idx = 0;
    while value >= u64::from(CONTINUATION) {
        out[idx] = (value as u8) | CONTINUATION;
        value >>= 7;
        idx += 1;
    }
    out[idx] = value as u8;
    idx + 1
}

/// Decode a varint from the front of `data`.
///
/// Returns:
/// * `Ok(Some((value, bytes_read)))` when a terminating byte was found.
/// * `Ok(None)` when `data` ran out before the varint terminated, callers
///   backed by a stream can refill and retry, array callers treat this as
///   truncation.
/// * `Err(MalformedVarint)` when 10 bytes were consumed without termination.
///
/// Bits beyond the 64th are discarded, matching how protobuf readers treat
/// over-long encodings.
#[inline]
pub fn decode_varint(data: &[u8]) -> Result<Option<(u64, usize)>, Error> {
    // Fast path, most varints on the wire are single byte tags or lengths.
    if let Some(&first) = data.first() {
        if likely(first < CONTINUATION) {
            return Ok(Some((u64::from(first), 1)));
        }
    }

    let mut value: u64 = 0;
    for (idx, &byte) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7f).wrapping_shl(7 * idx as u32);
        if byte < CONTINUATION {
            return Ok(Some((value, idx + 1)));
        }
    }

    if unlikely(data.len() >= MAX_VARINT_LEN) {
        Err(Error::MalformedVarint)
    } else {
        Ok(None)
    }
}

/// ZigZag encode a signed 32-bit integer, mapping small magnitudes to small
/// unsigned values: `0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, ...`
#[inline]
pub const fn zigzag_encode_32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Inverse of [`zigzag_encode_32`].
#[inline]
pub const fn zigzag_decode_32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ (-((n & 1) as i32))
}

/// ZigZag encode a signed 64-bit integer.
#[inline]
pub const fn zigzag_encode_64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode_64`].
#[inline]
pub const fn zigzag_decode_64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}
