//! Wire format for Google's Protocol Buffers, aka [protobuf](https://protobuf.dev).
//!
//! A tag is the varint that precedes every field on the wire and packs the
//! field number together with a [`WireType`]: `field_number << 3 | wire_type`.
//! Tag `0` never appears on the wire and is used as the "end of message"
//! sentinel by [`crate::decoder::Decoder::read_tag`].

use crate::error::{Error, InvalidTagReason};

/// Minimum value of a protobuf field number.
pub const MINIMUM_FIELD_NUMBER: u32 = 1;
/// Maximum value of a protobuf field number.
pub const MAXIMUM_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Number of low bits of a tag that hold the wire type.
pub const TAG_TYPE_BITS: u32 = 3;
const TAG_TYPE_MASK: u32 = (1 << TAG_TYPE_BITS) - 1;

/// Denotes the type of a field in an encoded protobuf message.
///
/// Protobuf messages are a series of key-value pairs. When encoded each key-value pair
/// is turned into a record consisting of a field number, a [`WireType`], and a payload.
/// The [`WireType`] indicates how large the proceeding payload is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable length integer.
    ///
    /// Used for: `int32`, `int64`, `uint32`, `uint64`, `sint32`, `sint64`, `bool`, `enum`.
    Varint = 0,
    /// 64-bit integer.
    ///
    /// Used for: `fixed64`, `sfixed64`, `double`.
    Fixed64 = 1,
    /// Variable length field.
    ///
    /// Used for: `string`, `bytes`, `message`, packed `repeated` fields.
    LengthDelimited = 2,
    /// Group start (deprecated).
    StartGroup = 3,
    /// Group end (deprecated).
    EndGroup = 4,
    /// 32-bit integer.
    ///
    /// Used for: `fixed32`, `sfixed32`, `float`.
    Fixed32 = 5,
}

// N.B. It's not super important that these are the same size, but keeping them as such
// allows the compiler to make as many optimizations as possible.
static_assertions::assert_eq_size!(WireType, u8);

#[allow(clippy::as_conversions)]
impl WireType {
    /// Maximum value an [`WireType`] can be.
    pub const MAX_VAL: u8 = WireType::Fixed32 as u8;

    /// Try to decode a [`WireType`] from the provided raw value.
    #[inline(always)]
    pub fn try_from_val(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            value => Err(Error::InvalidWireType { value }),
        }
    }

    /// Return the raw value for this [`WireType`].
    #[inline(always)]
    pub const fn into_val(self) -> u8 {
        self as u8
    }

    /// Number of payload bytes for fixed width wire types, `None` otherwise.
    #[inline]
    pub const fn fixed_len(self) -> Option<usize> {
        match self {
            WireType::Fixed32 => Some(4),
            WireType::Fixed64 => Some(8),
            _ => None,
        }
    }
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    #[inline(always)]
    fn try_from(value: u8) -> Result<Self, Error> {
        WireType::try_from_val(value)
    }
}

/// Packs a field number and wire type into a tag.
///
/// Follows the specification from <https://protobuf.dev/programming-guides/encoding>
/// under the "Message Structure" section.
#[inline(always)]
#[allow(clippy::as_conversions)]
pub const fn make_tag(field_number: u32, wire_type: WireType) -> u32 {
    (field_number << TAG_TYPE_BITS) | wire_type.into_val() as u32
}

/// Returns the field number portion of a tag.
#[inline(always)]
pub const fn tag_field_number(tag: u32) -> u32 {
    tag >> TAG_TYPE_BITS
}

/// Returns the wire type portion of a tag, failing for the unassigned values 6 and 7.
#[inline(always)]
#[allow(clippy::as_conversions)]
pub fn tag_wire_type(tag: u32) -> Result<WireType, Error> {
    WireType::try_from_val((tag & TAG_TYPE_MASK) as u8)
}

/// Validates a raw tag value as read off the wire.
///
/// The tag is read as a 64-bit varint, so it must first fit in 32 bits, and
/// the field number must be at least [`MINIMUM_FIELD_NUMBER`].
#[inline]
pub fn validate_raw_tag(raw: u64) -> Result<u32, Error> {
    let tag = u32::try_from(raw).map_err(|_| Error::invalid_tag(raw, InvalidTagReason::Overflow))?;
    if tag_field_number(tag) < MINIMUM_FIELD_NUMBER {
        return Err(Error::invalid_tag(raw, InvalidTagReason::ZeroFieldNumber));
    }
    Ok(tag)
}

/// Returns `true` if `field_number` can appear in a tag.
#[inline]
pub const fn is_valid_field_number(field_number: u32) -> bool {
    field_number >= MINIMUM_FIELD_NUMBER && field_number <= MAXIMUM_FIELD_NUMBER
}
