//! Writing primitive protobuf values to a byte sink.
//!
//! Mirror image of [`crate::decoder`]. The [`Encoder`] trait asks backings for
//! raw byte output only and provides every protobuf primitive on top:
//!
//! * [`ArrayEncoder`] writes into a fixed `&mut [u8]`.
//! * [`BufEncoder`] writes into any [`bytes::BufMut`], e.g. a `Vec<u8>` or `BytesMut`.
//! * [`StreamEncoder`] batches writes into a fixed buffer in front of a [`std::io::Write`].
//! * [`CountingEncoder`] discards bytes and only counts them, for exact size passes.
//!
//! Every `write_*_field` call first announces how many bytes it may need via
//! [`Encoder::ensure_room`], so a tag is never split from its value across a
//! buffer flush.

// This module uses `as` casts which have been thoroughly reviewed for correctness.
#![allow(clippy::as_conversions)]

mod array;
mod buf;
mod counting;
mod stream;

pub use array::ArrayEncoder;
pub use buf::BufEncoder;
pub use counting::CountingEncoder;
pub use stream::StreamEncoder;

use crate::error::{Error, Result};
use crate::leb128::{
    encode_varint_to_array, zigzag_encode_32, zigzag_encode_64, LebCodec, MAX_VARINT32_LEN,
    MAX_VARINT_LEN,
};
use crate::wire::{make_tag, WireType};

/// Largest encoded tag.
pub const MAX_TAG_LEN: usize = MAX_VARINT32_LEN;
/// Largest tag plus fixed-width or varint value, the unit we never split.
pub const MAX_ATOMIC_WRITE: usize = MAX_TAG_LEN + MAX_VARINT_LEN;
/// Largest length prefix decoders accept, lengths are read as `int32`.
pub const MAX_LENGTH_PREFIX: u32 = 0x7FFF_FFFF;

/// Convert a payload length into its wire prefix.
pub(crate) fn length_prefix(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|prefix| *prefix <= MAX_LENGTH_PREFIX)
        .ok_or(Error::LengthTooLarge { len })
}

/// An abstract sink for protobuf encoded bytes.
pub trait Encoder {
    /// Absolute number of bytes written so far.
    fn position(&self) -> u64;

    fn write_raw_byte(&mut self, byte: u8) -> Result<()>;

    fn write_raw_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Announce that up to `len` bytes belong together.
    ///
    /// Buffered backings flush here when the bytes would not fit. `len` is an
    /// upper bound, so fixed size backings only fail here once they are full
    /// and otherwise report `OutOfSpace` from the write that overflows.
    fn ensure_room(&mut self, _len: usize) -> Result<()> {
        Ok(())
    }

    /// Push buffered bytes to the sink and then flush the sink itself.
    fn flush(&mut self) -> Result<()>;

    #[inline]
    fn write_varint64(&mut self, value: u64) -> Result<()> {
        let mut scratch = [0u8; MAX_VARINT_LEN];
        let len = encode_varint_to_array(value, &mut scratch);
        self.write_raw_bytes(&scratch[..len])
    }

    #[inline]
    fn write_varint32(&mut self, value: u32) -> Result<()> {
        self.write_varint64(u64::from(value))
    }

    #[inline]
    fn write_fixed32(&mut self, value: u32) -> Result<()> {
        self.write_raw_bytes(&value.to_le_bytes())
    }

    #[inline]
    fn write_fixed64(&mut self, value: u64) -> Result<()> {
        self.write_raw_bytes(&value.to_le_bytes())
    }

    #[inline]
    fn write_tag(&mut self, field_number: u32, wire_type: WireType) -> Result<()> {
        self.write_varint32(make_tag(field_number, wire_type))
    }

    /// Write the tag and length prefix of a length-delimited field.
    ///
    /// The caller must follow up with exactly `len` bytes of payload.
    fn write_length_delimited_field(&mut self, field_number: u32, len: usize) -> Result<()> {
        let prefix = length_prefix(len)?;
        self.ensure_room(MAX_ATOMIC_WRITE)?;
        self.write_tag(field_number, WireType::LengthDelimited)?;
        self.write_varint32(prefix)
    }

    /// Write the length prefix of an untagged length-delimited value.
    fn write_length(&mut self, len: usize) -> Result<()> {
        self.write_varint32(length_prefix(len)?)
    }

    fn write_int32_field(&mut self, field_number: u32, value: i32) -> Result<()> {
        // Negative values are sign-extended to 64 bits.
        self.write_uint64_field(field_number, value as i64 as u64)
    }

    fn write_int64_field(&mut self, field_number: u32, value: i64) -> Result<()> {
        self.write_uint64_field(field_number, value as u64)
    }

    fn write_uint32_field(&mut self, field_number: u32, value: u32) -> Result<()> {
        self.write_uint64_field(field_number, u64::from(value))
    }

    fn write_uint64_field(&mut self, field_number: u32, value: u64) -> Result<()> {
        self.ensure_room(MAX_TAG_LEN + value.encoded_leb128_len())?;
        self.write_tag(field_number, WireType::Varint)?;
        self.write_varint64(value)
    }

    fn write_sint32_field(&mut self, field_number: u32, value: i32) -> Result<()> {
        self.write_uint64_field(field_number, u64::from(zigzag_encode_32(value)))
    }

    fn write_sint64_field(&mut self, field_number: u32, value: i64) -> Result<()> {
        self.write_uint64_field(field_number, zigzag_encode_64(value))
    }

    fn write_bool_field(&mut self, field_number: u32, value: bool) -> Result<()> {
        self.write_uint64_field(field_number, u64::from(value))
    }

    fn write_enum_field(&mut self, field_number: u32, value: i32) -> Result<()> {
        self.write_int32_field(field_number, value)
    }

    fn write_fixed32_field(&mut self, field_number: u32, value: u32) -> Result<()> {
        self.ensure_room(MAX_TAG_LEN + 4)?;
        self.write_tag(field_number, WireType::Fixed32)?;
        self.write_fixed32(value)
    }

    fn write_fixed64_field(&mut self, field_number: u32, value: u64) -> Result<()> {
        self.ensure_room(MAX_TAG_LEN + 8)?;
        self.write_tag(field_number, WireType::Fixed64)?;
        self.write_fixed64(value)
    }

    fn write_sfixed32_field(&mut self, field_number: u32, value: i32) -> Result<()> {
        self.write_fixed32_field(field_number, value as u32)
    }

    fn write_sfixed64_field(&mut self, field_number: u32, value: i64) -> Result<()> {
        self.write_fixed64_field(field_number, value as u64)
    }

    fn write_float_field(&mut self, field_number: u32, value: f32) -> Result<()> {
        self.write_fixed32_field(field_number, value.to_bits())
    }

    fn write_double_field(&mut self, field_number: u32, value: f64) -> Result<()> {
        self.write_fixed64_field(field_number, value.to_bits())
    }

    fn write_bytes_field(&mut self, field_number: u32, value: &[u8]) -> Result<()> {
        self.write_length_delimited_field(field_number, value.len())?;
        self.write_raw_bytes(value)
    }

    fn write_string_field(&mut self, field_number: u32, value: &str) -> Result<()> {
        self.write_bytes_field(field_number, value.as_bytes())
    }
}
