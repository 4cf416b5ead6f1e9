//! Pulling primitive protobuf values out of a byte source.
//!
//! [`Decoder`] is the contract every backing store implements. The backing
//! only supplies raw byte access and position tracking, everything protobuf
//! specific (tags, varints, length prefixes, skipping) is provided on top so
//! that all backings produce identical results:
//!
//! * [`ArrayDecoder`] reads from a flat `&[u8]`.
//! * [`BufDecoder`] reads from any [`bytes::Buf`], zero-copy for [`bytes::Bytes`].
//! * [`StreamDecoder`] reads from a [`std::io::Read`] through an internal buffer.
//!
//! All offsets are absolute, counted from the first byte the decoder saw.
//! A decoder has a *limit*, the offset it may not read past, which is narrowed
//! with [`Decoder::push_limit`] when entering a length-delimited nested message
//! and restored with [`Decoder::pop_limit`]. Independently it has a *global
//! limit* bounding the total number of bytes read, which guards against a
//! hostile length prefix making us buffer an unbounded amount of data.

// This module uses `as` casts which have been thoroughly reviewed for correctness.
#![allow(clippy::as_conversions)]

mod array;
mod buf;
mod stream;

pub use array::ArrayDecoder;
pub use buf::BufDecoder;
pub use stream::{StreamDecoder, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::leb128::{zigzag_decode_32, zigzag_decode_64, MAX_VARINT_LEN};
use crate::wire::{self, make_tag, tag_field_number, WireType};

/// Default bound on how deeply groups may nest while being skipped.
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Limit bookkeeping shared by every [`Decoder`] backing.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Absolute offset we may not read past, `u64::MAX` when unbounded.
    limit: u64,
    /// Absolute offset bounding the total number of bytes read.
    global_limit: u64,
    /// Most recent value returned by `read_tag`.
    last_tag: u32,
    recursion_depth: usize,
    recursion_limit: usize,
}

impl Limits {
    /// Create limits for a source with `len` readable bytes, `None` if unknown.
    pub fn new(len: Option<u64>) -> Self {
        Limits {
            limit: len.unwrap_or(u64::MAX),
            global_limit: u64::MAX,
            last_tag: 0,
            recursion_depth: 0,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Check that `len` bytes can be read starting at absolute offset `pos`.
    #[inline]
    pub fn check(&self, pos: u64, len: usize) -> Result<()> {
        let end = pos.saturating_add(len as u64);
        if end > self.limit {
            return Err(Error::truncated());
        }
        if end > self.global_limit {
            return Err(Error::GlobalLimitExceeded {
                limit: self.global_limit,
            });
        }
        Ok(())
    }

    /// Number of bytes from `pos` until the nearer of the two limits.
    #[inline]
    pub fn readable_from(&self, pos: u64) -> u64 {
        self.limit.min(self.global_limit).saturating_sub(pos)
    }

    /// The error to report when a read of `len` bytes at `pos` could not be satisfied.
    #[cold]
    pub fn exhausted(&self, pos: u64, len: usize) -> Error {
        match self.check(pos, len) {
            Err(err) => err,
            Ok(()) => Error::truncated(),
        }
    }

    pub fn limit(&self) -> Option<u64> {
        (self.limit != u64::MAX).then_some(self.limit)
    }
}

/// An abstract source of protobuf encoded bytes.
///
/// Implementors provide the `read_raw_*`/`skip_raw_bytes` primitives and
/// access to their [`Limits`], they must honor both limits in every primitive.
pub trait Decoder {
    /// Absolute number of bytes consumed so far.
    fn position(&self) -> u64;

    /// Returns `true` if the current limit was reached or the source is exhausted.
    fn is_at_end(&mut self) -> Result<bool>;

    /// Read a single byte.
    fn read_raw_byte(&mut self) -> Result<u8>;

    /// Fill `dst` entirely from the source.
    fn read_raw_into(&mut self, dst: &mut [u8]) -> Result<()>;

    /// Read exactly `len` bytes.
    fn read_raw_bytes(&mut self, len: usize) -> Result<Bytes>;

    /// Discard exactly `len` bytes.
    fn skip_raw_bytes(&mut self, len: usize) -> Result<()>;

    fn limits(&self) -> &Limits;

    fn limits_mut(&mut self) -> &mut Limits;

    /// Read a base-128 varint of up to 10 bytes.
    ///
    /// Backings override this with a fast path over their contiguous bytes.
    fn read_varint64(&mut self) -> Result<u64> {
        read_varint_bytewise(self)
    }

    /// Read a varint keeping only the low 32 bits.
    ///
    /// Negative `int32` values are sign-extended to 10 bytes on the wire, so
    /// the full varint is always consumed.
    #[inline]
    fn read_varint32(&mut self) -> Result<u32> {
        Ok(self.read_varint64()? as u32)
    }

    /// Read the next tag, returning `0` at the end of input or at the current limit.
    fn read_tag(&mut self) -> Result<u32> {
        if self.is_at_end()? {
            self.limits_mut().last_tag = 0;
            return Ok(0);
        }
        let raw = self.read_varint64()?;
        let tag = wire::validate_raw_tag(raw)?;
        self.limits_mut().last_tag = tag;
        Ok(tag)
    }

    /// The tag most recently returned by [`Decoder::read_tag`].
    fn last_tag(&self) -> u32 {
        self.limits().last_tag
    }

    /// Verify the most recently read tag was `expected`.
    ///
    /// Used after a nested message or group to confirm it consumed exactly
    /// its own bytes. `expected == 0` is also satisfied when the input is now
    /// at its end.
    fn check_last_tag_was(&mut self, expected: u32) -> Result<()> {
        let actual = self.last_tag();
        if actual == expected || (expected == 0 && self.is_at_end()?) {
            Ok(())
        } else {
            Err(Error::TagMismatch { expected, actual })
        }
    }

    /// Skip the value of a field whose tag was just read.
    ///
    /// Returns `false` if the tag was an END_GROUP, signalling the caller to stop.
    fn skip_field(&mut self, tag: u32) -> Result<bool> {
        match wire::tag_wire_type(tag)? {
            WireType::Varint => {
                self.read_varint64()?;
            }
            WireType::Fixed64 => self.skip_raw_bytes(8)?,
            WireType::Fixed32 => self.skip_raw_bytes(4)?,
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                self.skip_raw_bytes(len)?;
            }
            WireType::StartGroup => {
                self.enter_recursion()?;
                self.skip_message()?;
                self.leave_recursion();
                self.check_last_tag_was(make_tag(tag_field_number(tag), WireType::EndGroup))?;
            }
            WireType::EndGroup => return Ok(false),
        }
        Ok(true)
    }

    /// Skip fields until the end of the message or an END_GROUP tag.
    fn skip_message(&mut self) -> Result<()> {
        loop {
            let tag = self.read_tag()?;
            if tag == 0 || !self.skip_field(tag)? {
                return Ok(());
            }
        }
    }

    /// Read a length prefix, validating it against the current limit.
    fn read_length(&mut self) -> Result<usize> {
        // Lengths are `int32` on the wire.
        let length = self.read_varint64()? as u32 as i32;
        if length < 0 {
            return Err(Error::NegativeLength { length });
        }
        let length = length as usize;
        self.limits().check(self.position(), length)?;
        Ok(length)
    }

    /// Narrow the limit to `len` bytes past the current position.
    ///
    /// Fails with [`Error::MessageTruncated`] if the new limit would overrun
    /// the one currently active, before any bytes are read. Returns the old
    /// limit which must be handed back to [`Decoder::pop_limit`].
    fn push_limit(&mut self, len: usize) -> Result<u64> {
        let pos = self.position();
        self.limits().check(pos, len)?;
        let limits = self.limits_mut();
        let old = limits.limit;
        limits.limit = pos + len as u64;
        Ok(old)
    }

    /// Restore a limit returned by [`Decoder::push_limit`].
    fn pop_limit(&mut self, old_limit: u64) {
        self.limits_mut().limit = old_limit;
    }

    /// Bytes remaining until the current limit, `None` when unbounded.
    fn bytes_until_limit(&self) -> Option<u64> {
        self.limits()
            .limit()
            .map(|limit| limit.saturating_sub(self.position()))
    }

    /// Bound the total number of bytes this decoder will read, returning the previous bound.
    fn set_global_limit(&mut self, limit: u64) -> u64 {
        core::mem::replace(&mut self.limits_mut().global_limit, limit)
    }

    /// Bound how deeply groups may nest while skipping.
    fn set_recursion_limit(&mut self, limit: usize) {
        self.limits_mut().recursion_limit = limit;
    }

    #[doc(hidden)]
    fn enter_recursion(&mut self) -> Result<()> {
        let limits = self.limits_mut();
        if limits.recursion_depth >= limits.recursion_limit {
            return Err(Error::NestingTooDeep {
                limit: limits.recursion_limit,
            });
        }
        limits.recursion_depth += 1;
        Ok(())
    }

    #[doc(hidden)]
    fn leave_recursion(&mut self) {
        let limits = self.limits_mut();
        limits.recursion_depth = limits.recursion_depth.saturating_sub(1);
    }

    fn read_fixed32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read_raw_into(&mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    fn read_fixed64(&mut self) -> Result<u64> {
        let mut raw = [0u8; 8];
        self.read_raw_into(&mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    fn read_int32(&mut self) -> Result<i32> {
        Ok(self.read_varint32()? as i32)
    }

    fn read_int64(&mut self) -> Result<i64> {
        Ok(self.read_varint64()? as i64)
    }

    fn read_uint32(&mut self) -> Result<u32> {
        self.read_varint32()
    }

    fn read_uint64(&mut self) -> Result<u64> {
        self.read_varint64()
    }

    fn read_sint32(&mut self) -> Result<i32> {
        Ok(zigzag_decode_32(self.read_varint32()?))
    }

    fn read_sint64(&mut self) -> Result<i64> {
        Ok(zigzag_decode_64(self.read_varint64()?))
    }

    fn read_sfixed32(&mut self) -> Result<i32> {
        Ok(self.read_fixed32()? as i32)
    }

    fn read_sfixed64(&mut self) -> Result<i64> {
        Ok(self.read_fixed64()? as i64)
    }

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_varint64()? != 0)
    }

    fn read_enum(&mut self) -> Result<i32> {
        self.read_int32()
    }

    fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_fixed32()?))
    }

    fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    /// Read a length-delimited UTF-8 string.
    fn read_string(&mut self) -> Result<String> {
        let len = self.read_length()?;
        let raw = self.read_raw_bytes(len)?;
        core::str::from_utf8(&raw)
            .map(str::to_owned)
            .map_err(|_| Error::InvalidUtf8)
    }

    /// Read length-delimited bytes into a fresh `Vec`.
    fn read_byte_array(&mut self) -> Result<Vec<u8>> {
        let len = self.read_length()?;
        Ok(self.read_raw_bytes(len)?.to_vec())
    }

    /// Read length-delimited bytes as a [`Bytes`] buffer, zero-copy where the backing allows.
    fn read_byte_buffer(&mut self) -> Result<Bytes> {
        let len = self.read_length()?;
        self.read_raw_bytes(len)
    }
}

/// Decode a varint one byte at a time, used when the backing can't offer a
/// contiguous window that is guaranteed to hold the whole varint.
pub(crate) fn read_varint_bytewise<D: Decoder + ?Sized>(decoder: &mut D) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for _ in 0..MAX_VARINT_LEN {
        let byte = decoder.read_raw_byte()?;
        value |= u64::from(byte & 0x7f).wrapping_shl(shift);
        if byte < 0x80 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(Error::MalformedVarint)
}
