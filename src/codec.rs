//! Typed values that map onto a single protobuf wire type.
//!
//! [`Scalar`] is implemented for the Rust primitives that have one obvious
//! protobuf counterpart (`int32` is `i32`, `string` is `String`, ...). The
//! encodings without a unique primitive get newtypes, e.g. [`Sint32`] for
//! the zigzag encoded `sint32`.

mod scalar;

pub use scalar::{Fixed32, Fixed64, Sfixed32, Sfixed64, Sint32, Sint64};

use bytes::Bytes;

use crate::decoder::Decoder;
use crate::encoder::{Encoder, MAX_ATOMIC_WRITE};
use crate::error::{Error, Result};
use crate::unknown::UnknownValue;
use crate::wire::WireType;

/// A value with a fixed protobuf wire representation.
pub trait Scalar: Sized {
    /// The wire type used to encode this type.
    const WIRE_TYPE: WireType;

    /// Whether repeated occurrences may be packed into one length-delimited run.
    const PACKABLE: bool = !matches!(Self::WIRE_TYPE, WireType::LengthDelimited);

    /// Read the value that follows a tag.
    fn read_value(decoder: &mut dyn Decoder) -> Result<Self>;

    /// Convert an occurrence previously captured into an [`crate::UnknownFieldSet`].
    fn from_unknown(value: UnknownValue) -> Result<Self>;

    /// Write the value alone, without a tag.
    fn write_value(&self, encoder: &mut dyn Encoder) -> Result<()>;

    /// Returns the encoded length of this value (not including field key).
    fn encoded_len(&self) -> usize;

    /// Write the tag for `field_number` followed by the value.
    fn write_field(&self, field_number: u32, encoder: &mut dyn Encoder) -> Result<()> {
        encoder.ensure_room(MAX_ATOMIC_WRITE)?;
        encoder.write_tag(field_number, Self::WIRE_TYPE)?;
        self.write_value(encoder)
    }
}

#[cold]
fn unexpected(value: &UnknownValue) -> Error {
    Error::InvalidWireType {
        value: value.wire_type().into_val(),
    }
}

fn expect_varint(value: UnknownValue) -> Result<u64> {
    match value {
        UnknownValue::Varint(raw) => Ok(raw),
        other => Err(unexpected(&other)),
    }
}

fn expect_fixed32(value: UnknownValue) -> Result<u32> {
    match value {
        UnknownValue::Fixed32(raw) => Ok(raw),
        other => Err(unexpected(&other)),
    }
}

fn expect_fixed64(value: UnknownValue) -> Result<u64> {
    match value {
        UnknownValue::Fixed64(raw) => Ok(raw),
        other => Err(unexpected(&other)),
    }
}

fn expect_bytes(value: UnknownValue) -> Result<Bytes> {
    match value {
        UnknownValue::LengthDelimited(raw) => Ok(raw),
        other => Err(unexpected(&other)),
    }
}
