//! Preservation of fields the active schema does not recognize.
//!
//! An [`UnknownFieldSet`] maps each field number to a FIFO queue of captured
//! values. Values are captured while a message is being read, may be consumed
//! again by a later schema-directed read of the same field, and whatever is
//! left is written back out verbatim, in ascending tag order, so that data
//! from a newer schema survives a read/write cycle through an older one.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use smallvec::SmallVec;

use crate::decoder::Decoder;
use crate::encoder::{Encoder, MAX_ATOMIC_WRITE};
use crate::error::Result;
use crate::leb128::LebCodec;
use crate::util::CastFrom;
use crate::wire::{self, make_tag, tag_field_number, WireType};

/// A single captured occurrence of an unknown field.
#[derive(Debug, Clone, PartialEq)]
pub enum UnknownValue {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    LengthDelimited(Bytes),
    /// A START_GROUP/END_GROUP delimited group, captured recursively.
    Group(UnknownFieldSet),
}

impl UnknownValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            UnknownValue::Varint(_) => WireType::Varint,
            UnknownValue::Fixed32(_) => WireType::Fixed32,
            UnknownValue::Fixed64(_) => WireType::Fixed64,
            UnknownValue::LengthDelimited(_) => WireType::LengthDelimited,
            UnknownValue::Group(_) => WireType::StartGroup,
        }
    }

    fn write_to(&self, field_number: u32, encoder: &mut dyn Encoder) -> Result<()> {
        match self {
            UnknownValue::Varint(value) => encoder.write_uint64_field(field_number, *value),
            UnknownValue::Fixed32(value) => encoder.write_fixed32_field(field_number, *value),
            UnknownValue::Fixed64(value) => encoder.write_fixed64_field(field_number, *value),
            UnknownValue::LengthDelimited(bytes) => encoder.write_bytes_field(field_number, bytes),
            UnknownValue::Group(group) => {
                encoder.ensure_room(MAX_ATOMIC_WRITE)?;
                encoder.write_tag(field_number, WireType::StartGroup)?;
                group.write_to(encoder)?;
                encoder.write_tag(field_number, WireType::EndGroup)
            }
        }
    }

    /// Encoded size of the value alone, excluding its tag.
    fn encoded_len(&self, field_number: u32) -> usize {
        match self {
            UnknownValue::Varint(value) => value.encoded_leb128_len(),
            UnknownValue::Fixed32(_) => 4,
            UnknownValue::Fixed64(_) => 8,
            UnknownValue::LengthDelimited(bytes) => {
                u64::cast_from(bytes.len()).encoded_leb128_len() + bytes.len()
            }
            UnknownValue::Group(group) => {
                let end = make_tag(field_number, WireType::EndGroup);
                group.encoded_len() + end.encoded_leb128_len()
            }
        }
    }
}

/// Fields captured from the wire that no schema-directed read claimed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnknownFieldSet {
    /// Keyed by field number, each queue keeps capture order across wire types
    /// so schema reads see packed and unpacked occurrences in wire order.
    fields: BTreeMap<u32, VecDeque<UnknownValue>>,
}

impl UnknownFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing is captured.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total number of captured occurrences across all fields.
    pub fn len(&self) -> usize {
        self.fields.values().map(VecDeque::len).sum()
    }

    /// Capture the value of `tag`, which was just read from `decoder`.
    ///
    /// Returns `false` without consuming anything if `tag` is an END_GROUP,
    /// signalling the caller that the enclosing group ended.
    pub fn read_single_field(&mut self, tag: u32, decoder: &mut dyn Decoder) -> Result<bool> {
        let field_number = tag_field_number(tag);
        let value = match wire::tag_wire_type(tag)? {
            WireType::Varint => UnknownValue::Varint(decoder.read_varint64()?),
            WireType::Fixed64 => UnknownValue::Fixed64(decoder.read_fixed64()?),
            WireType::Fixed32 => UnknownValue::Fixed32(decoder.read_fixed32()?),
            WireType::LengthDelimited => UnknownValue::LengthDelimited(decoder.read_byte_buffer()?),
            WireType::StartGroup => {
                decoder.enter_recursion()?;
                let mut group = UnknownFieldSet::new();
                group.read_all_fields(decoder)?;
                decoder.leave_recursion();
                decoder.check_last_tag_was(make_tag(field_number, WireType::EndGroup))?;
                UnknownValue::Group(group)
            }
            WireType::EndGroup => return Ok(false),
        };
        tracing::trace!(field_number, wire_type = ?value.wire_type(), "captured unknown field");
        self.push(field_number, value);
        Ok(true)
    }

    /// Capture every remaining field until the end of input or an END_GROUP tag.
    pub fn read_all_fields(&mut self, decoder: &mut dyn Decoder) -> Result<()> {
        loop {
            let tag = decoder.read_tag()?;
            if tag == 0 || !self.read_single_field(tag, decoder)? {
                return Ok(());
            }
        }
    }

    /// Remove and return the oldest captured value carrying exactly `tag`.
    pub fn consume_tag(&mut self, tag: u32) -> Option<UnknownValue> {
        let wire_type = wire::tag_wire_type(tag).ok()?;
        self.consume_field(tag_field_number(tag), &[wire_type])
    }

    /// Remove and return the oldest captured value of `field_number` whose
    /// wire type is one of `wire_types`.
    pub fn consume_field(
        &mut self,
        field_number: u32,
        wire_types: &[WireType],
    ) -> Option<UnknownValue> {
        let values = self.fields.get_mut(&field_number)?;
        let idx = values
            .iter()
            .position(|value| wire_types.contains(&value.wire_type()))?;
        let value = values.remove(idx);
        if values.is_empty() {
            self.fields.remove(&field_number);
        }
        value
    }

    /// Record a varint for `field_number`, e.g. an enum number the schema doesn't define.
    pub fn put_varint_field(&mut self, field_number: u32, value: u64) {
        self.push(field_number, UnknownValue::Varint(value));
    }

    /// Append a value to the back of `field_number`'s queue.
    pub fn push(&mut self, field_number: u32, value: UnknownValue) {
        self.fields.entry(field_number).or_default().push_back(value);
    }

    /// Returns `true` if at least one value is captured for exactly `tag`.
    pub fn has_tag(&self, tag: u32) -> bool {
        let Ok(wire_type) = wire::tag_wire_type(tag) else {
            return false;
        };
        self.fields
            .get(&tag_field_number(tag))
            .is_some_and(|values| values.iter().any(|value| value.wire_type() == wire_type))
    }

    /// Returns `true` if a value is captured for `field_number` with any wire type.
    pub fn contains_field(&self, field_number: u32) -> bool {
        self.fields.contains_key(&field_number)
    }

    /// Iterate over `(field_number, value)` pairs in ascending tag order,
    /// capture order within a tag.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &UnknownValue)> + '_ {
        self.fields.iter().flat_map(|(field, values)| {
            let mut ordered: SmallVec<[&UnknownValue; 4]> = values.iter().collect();
            // Stable, so values sharing a tag keep their order.
            ordered.sort_by_key(|value| value.wire_type().into_val());
            ordered.into_iter().map(move |value| (*field, value))
        })
    }

    /// The distinct field numbers present, ascending.
    pub fn field_numbers(&self) -> Vec<u32> {
        self.fields.keys().copied().collect()
    }

    /// Move every value of `other` to the back of this set's queues.
    pub fn merge_from(&mut self, other: UnknownFieldSet) {
        for (field, mut values) in other.fields {
            self.fields.entry(field).or_default().append(&mut values);
        }
    }

    /// Exact number of bytes [`UnknownFieldSet::write_to`] will produce.
    pub fn encoded_len(&self) -> usize {
        self.iter()
            .map(|(field, value)| {
                make_tag(field, value.wire_type()).encoded_leb128_len() + value.encoded_len(field)
            })
            .sum()
    }

    /// Emit every captured value in ascending tag order.
    pub fn write_to(&self, encoder: &mut dyn Encoder) -> Result<()> {
        for (field, value) in self.iter() {
            value.write_to(field, encoder)?;
        }
        Ok(())
    }
}
