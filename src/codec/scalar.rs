//! Scalar protobuf types and their encoding/decoding implementations.

// This module uses `as` casts which have been thoroughly reviewed for correctness.
#![allow(clippy::as_conversions)]

use bytes::Bytes;

use super::{expect_bytes, expect_fixed32, expect_fixed64, expect_varint, Scalar};
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::leb128::{zigzag_decode_32, zigzag_decode_64, zigzag_encode_32, zigzag_encode_64, LebCodec};
use crate::unknown::UnknownValue;
use crate::util::CastFrom;
use crate::wire::WireType;

impl Scalar for u64 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_uint64()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_varint(value)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_varint64(*self)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        self.encoded_leb128_len()
    }
}

impl Scalar for u32 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_uint32()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_varint(value).map(|raw| raw as u32)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_varint32(*self)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        self.encoded_leb128_len()
    }
}

impl Scalar for i64 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_int64()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_varint(value).map(|raw| raw as i64)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_varint64(*self as u64)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        (*self as u64).encoded_leb128_len()
    }
}

impl Scalar for i32 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_int32()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_varint(value).map(|raw| raw as i32)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        // Negative values are sign-extended to 64 bits.
        encoder.write_varint64(*self as i64 as u64)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        (*self as i64 as u64).encoded_leb128_len()
    }
}

impl Scalar for bool {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_bool()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_varint(value).map(|raw| raw != 0)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_raw_byte(u8::from(*self))
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        1
    }
}

impl Scalar for f32 {
    const WIRE_TYPE: WireType = WireType::Fixed32;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_float()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_fixed32(value).map(f32::from_bits)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_fixed32(self.to_bits())
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        4
    }
}

impl Scalar for f64 {
    const WIRE_TYPE: WireType = WireType::Fixed64;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_double()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_fixed64(value).map(f64::from_bits)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_fixed64(self.to_bits())
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        8
    }
}

fn write_delimited(bytes: &[u8], encoder: &mut dyn Encoder) -> Result<()> {
    encoder.write_length(bytes.len())?;
    encoder.write_raw_bytes(bytes)
}

fn delimited_len(len: usize) -> usize {
    u64::cast_from(len).encoded_leb128_len() + len
}

impl Scalar for String {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_string()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        let raw = expect_bytes(value)?;
        core::str::from_utf8(&raw)
            .map(str::to_owned)
            .map_err(|_| Error::InvalidUtf8)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        write_delimited(self.as_bytes(), encoder)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        delimited_len(self.len())
    }
}

impl Scalar for Bytes {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_byte_buffer()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_bytes(value)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        write_delimited(self, encoder)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        delimited_len(self.len())
    }
}

impl Scalar for Vec<u8> {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_byte_array()
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_bytes(value).map(|raw| raw.to_vec())
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        write_delimited(self, encoder)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        delimited_len(self.len())
    }
}

/// Wrapper for protobuf `sint32` (zigzag-encoded signed 32-bit integer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Sint32(pub i32);

impl Scalar for Sint32 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_sint32().map(Sint32)
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_varint(value).map(|raw| Sint32(zigzag_decode_32(raw as u32)))
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_varint32(zigzag_encode_32(self.0))
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        zigzag_encode_32(self.0).encoded_leb128_len()
    }
}

/// Wrapper for protobuf `sint64` (zigzag-encoded signed 64-bit integer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Sint64(pub i64);

impl Scalar for Sint64 {
    const WIRE_TYPE: WireType = WireType::Varint;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_sint64().map(Sint64)
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_varint(value).map(|raw| Sint64(zigzag_decode_64(raw)))
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_varint64(zigzag_encode_64(self.0))
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        zigzag_encode_64(self.0).encoded_leb128_len()
    }
}

/// Wrapper for protobuf `fixed32` (always 4 bytes, little endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Fixed32(pub u32);

impl Scalar for Fixed32 {
    const WIRE_TYPE: WireType = WireType::Fixed32;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_fixed32().map(Fixed32)
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_fixed32(value).map(Fixed32)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_fixed32(self.0)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        4
    }
}

/// Wrapper for protobuf `sfixed32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Sfixed32(pub i32);

impl Scalar for Sfixed32 {
    const WIRE_TYPE: WireType = WireType::Fixed32;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_sfixed32().map(Sfixed32)
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_fixed32(value).map(|raw| Sfixed32(raw as i32))
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_fixed32(self.0 as u32)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        4
    }
}

/// Wrapper for protobuf `fixed64` (always 8 bytes, little endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Fixed64(pub u64);

impl Scalar for Fixed64 {
    const WIRE_TYPE: WireType = WireType::Fixed64;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_fixed64().map(Fixed64)
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_fixed64(value).map(Fixed64)
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_fixed64(self.0)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        8
    }
}

/// Wrapper for protobuf `sfixed64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Sfixed64(pub i64);

impl Scalar for Sfixed64 {
    const WIRE_TYPE: WireType = WireType::Fixed64;

    fn read_value(decoder: &mut dyn Decoder) -> Result<Self> {
        decoder.read_sfixed64().map(Sfixed64)
    }

    fn from_unknown(value: UnknownValue) -> Result<Self> {
        expect_fixed64(value).map(|raw| Sfixed64(raw as i64))
    }

    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.write_fixed64(self.0 as u64)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        8
    }
}
