//! Per-message state handed to marshallers.
//!
//! A [`ReadContext`] is created for every message (or group) being decoded.
//! Reads are field oriented: asking for field `n` first looks for an
//! occurrence captured earlier, then pulls tags off the wire, capturing every
//! tag that isn't `n` into the context's [`UnknownFieldSet`], until `n` shows
//! up or the message ends. When the marshaller returns, the rest of the
//! message is captured the same way and required fields are checked.
//!
//! A [`WriteContext`] is the mirror image: it validates that each field is
//! written at most once, that required fields were written, and finally emits
//! the unknown fields the marshaller attached.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use smallvec::SmallVec;

use crate::codec::Scalar;
use crate::decoder::{BufDecoder, Decoder};
use crate::descriptor::MessageDescriptor;
use crate::encoder::{BufEncoder, Encoder};
use crate::error::{Error, Result};
use crate::registry::{EnumDelegate, MessageDelegate};
use crate::tag_reader::TagReader;
use crate::tag_writer::TagWriter;
use crate::unknown::{UnknownFieldSet, UnknownValue};
use crate::util::CastFrom;
use crate::wire::{make_tag, WireType};

/// Key/value parameters threaded through nested readers and writers.
///
/// Values set on a scope are visible to it and to every scope nested inside
/// it. Lookups walk from the innermost scope towards the root.
#[derive(Debug, Default)]
pub struct Params<'p> {
    values: HashMap<String, Box<dyn Any>>,
    parent: Option<&'p Params<'p>>,
}

impl<'p> Params<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty scope whose lookups fall back to `parent`.
    pub fn scoped(parent: &'p Params<'p>) -> Self {
        Params {
            values: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Set `key` in this scope, shadowing any outer value.
    pub fn set<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Look `key` up in this scope and then its ancestors.
    ///
    /// Returns `None` if the nearest value for `key` is not a `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        match self.values.get(key) {
            Some(value) => value.downcast_ref(),
            None => self.parent?.get(key),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.parent.is_some_and(|parent| parent.contains(key))
    }
}

/// Field numbers below this are tracked in a bitset.
const DENSE_FIELDS: u32 = 1 << 12;

/// Set of field numbers accessed within one message.
#[derive(Debug, Default)]
struct FieldSet {
    dense: SmallVec<[u64; 2]>,
    sparse: BTreeSet<u32>,
}

impl FieldSet {
    /// Returns `true` if `number` was not present yet.
    fn insert(&mut self, number: u32) -> bool {
        if number >= DENSE_FIELDS {
            return self.sparse.insert(number);
        }
        let word = usize::cast_from(number / 64);
        let bit = 1u64 << (number % 64);
        if self.dense.len() <= word {
            self.dense.resize(word + 1, 0);
        }
        let fresh = self.dense[word] & bit == 0;
        self.dense[word] |= bit;
        fresh
    }

    fn contains(&self, number: u32) -> bool {
        if number >= DENSE_FIELDS {
            return self.sparse.contains(&number);
        }
        let word = usize::cast_from(number / 64);
        self.dense
            .get(word)
            .is_some_and(|bits| bits & (1u64 << (number % 64)) != 0)
    }
}

/// Where the next value of a field comes from.
enum Occurrence {
    /// Captured earlier while scanning for another field.
    Captured(UnknownValue),
    /// The tag was just read, the value follows on the wire.
    Wire(WireType),
}

/// Read `len` bytes worth of packed values from the wire.
fn read_packed_run<T>(
    decoder: &mut dyn Decoder,
    read: fn(&mut dyn Decoder) -> Result<T>,
    out: &mut Vec<T>,
) -> Result<()> {
    let len = decoder.read_length()?;
    let old = decoder.push_limit(len)?;
    while !decoder.is_at_end()? {
        out.push(read(&mut *decoder)?);
    }
    decoder.pop_limit(old);
    Ok(())
}

/// Read packed values out of a captured length-delimited payload.
fn unpack_captured<T>(
    payload: Bytes,
    read: fn(&mut dyn Decoder) -> Result<T>,
    out: &mut Vec<T>,
) -> Result<()> {
    let mut decoder = BufDecoder::new(payload);
    while !decoder.is_at_end()? {
        out.push(read(&mut decoder)?);
    }
    Ok(())
}

fn read_enum_number(decoder: &mut dyn Decoder) -> Result<i32> {
    decoder.read_enum()
}

/// Decoding state for one message or group.
#[derive(Debug)]
pub struct ReadContext<'a> {
    reader: TagReader<'a>,
    descriptor: Arc<MessageDescriptor>,
    /// Tag that ends this message, `0` or the END_GROUP tag of a group.
    end_tag: u32,
    seen: FieldSet,
    unknown: UnknownFieldSet,
    /// Fields whose unknown occurrences were handed out by `take_unknown_fields`.
    taken: FieldSet,
    /// The end tag was reached, everything left is in `unknown`.
    exhausted: bool,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(reader: TagReader<'a>, descriptor: Arc<MessageDescriptor>, end_tag: u32) -> Self {
        ReadContext {
            reader,
            descriptor,
            end_tag,
            seen: FieldSet::default(),
            unknown: UnknownFieldSet::new(),
            taken: FieldSet::default(),
            exhausted: false,
        }
    }

    /// Fully qualified name of the message being read.
    pub fn type_name(&self) -> &Arc<str> {
        self.descriptor.full_name()
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// The underlying reader, for marshallers that drive the wire directly.
    pub fn reader(&mut self) -> &mut TagReader<'a> {
        &mut self.reader
    }

    pub fn param<T: Any>(&self, key: &str) -> Option<&T> {
        self.reader.param(key)
    }

    pub fn set_param<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.reader.set_param(key, value);
    }

    /// Unknown fields captured so far.
    pub fn unknown_fields(&self) -> &UnknownFieldSet {
        &self.unknown
    }

    /// Capture the rest of the message and hand over every unknown field.
    ///
    /// Call this after every declared field was read, fields read afterwards
    /// can no longer fall back to captured occurrences.
    pub fn take_unknown_fields(&mut self) -> Result<UnknownFieldSet> {
        self.drain()?;
        for number in self.unknown.field_numbers() {
            self.taken.insert(number);
        }
        Ok(core::mem::take(&mut self.unknown))
    }

    /// Read a singular scalar field.
    pub fn read<T: Scalar>(&mut self, field_number: u32) -> Result<Option<T>> {
        self.claim(field_number)?;
        let value = match self.next_occurrence(field_number, &[T::WIRE_TYPE])? {
            Some(Occurrence::Captured(value)) => Some(T::from_unknown(value)?),
            Some(Occurrence::Wire(_)) => Some(T::read_value(&mut self.reader)?),
            None => None,
        };
        if value.is_none() {
            self.check_present(field_number)?;
        }
        Ok(value)
    }

    /// Read every occurrence of a repeated scalar field, packed or not.
    pub fn read_repeated<T: Scalar>(&mut self, field_number: u32) -> Result<Vec<T>> {
        self.claim(field_number)?;
        let values = self.collect_repeated(
            field_number,
            T::WIRE_TYPE,
            T::PACKABLE,
            T::read_value,
            T::from_unknown,
        )?;
        if values.is_empty() {
            self.check_present(field_number)?;
        }
        Ok(values)
    }

    /// Read a singular embedded message field.
    pub fn read_message<T: 'static>(&mut self, field_number: u32) -> Result<Option<T>> {
        self.claim(field_number)?;
        let delegate = self.reader.registry().get_marshaller_delegate::<T>()?;
        let value = self.next_message(field_number, &delegate)?;
        if value.is_none() {
            self.check_present(field_number)?;
        }
        Ok(value)
    }

    pub fn read_repeated_messages<T: 'static>(&mut self, field_number: u32) -> Result<Vec<T>> {
        self.claim(field_number)?;
        let delegate = self.reader.registry().get_marshaller_delegate::<T>()?;
        let mut out = Vec::new();
        while let Some(value) = self.next_message(field_number, &delegate)? {
            out.push(value);
        }
        if out.is_empty() {
            self.check_present(field_number)?;
        }
        Ok(out)
    }

    /// Read a singular enum field.
    ///
    /// A number the enum doesn't define is preserved as an unknown varint and
    /// reads as `None`.
    pub fn read_enum<E: 'static>(&mut self, field_number: u32) -> Result<Option<E>> {
        self.claim(field_number)?;
        let delegate = self.reader.registry().get_enum_delegate::<E>()?;
        let number = match self.next_occurrence(field_number, &[WireType::Varint])? {
            Some(Occurrence::Captured(value)) => i32::from_unknown(value)?,
            Some(Occurrence::Wire(_)) => self.reader.read_enum()?,
            None => {
                self.check_present(field_number)?;
                return Ok(None);
            }
        };
        match delegate.decode(number) {
            Some(value) => Ok(Some(value)),
            None => {
                self.preserve_undefined(&delegate, field_number, number);
                Ok(None)
            }
        }
    }

    /// Read every occurrence of a repeated enum field, packed or not.
    pub fn read_repeated_enums<E: 'static>(&mut self, field_number: u32) -> Result<Vec<E>> {
        self.claim(field_number)?;
        let delegate = self.reader.registry().get_enum_delegate::<E>()?;
        let numbers = self.collect_repeated(
            field_number,
            WireType::Varint,
            true,
            read_enum_number,
            i32::from_unknown,
        )?;

        let mut out = Vec::with_capacity(numbers.len());
        for number in numbers {
            match delegate.decode(number) {
                Some(value) => out.push(value),
                None => self.preserve_undefined(&delegate, field_number, number),
            }
        }
        if out.is_empty() {
            self.check_present(field_number)?;
        }
        Ok(out)
    }

    /// Read a singular group field.
    pub fn read_group<T: 'static>(&mut self, field_number: u32) -> Result<Option<T>> {
        self.claim(field_number)?;
        let delegate = self.reader.registry().get_marshaller_delegate::<T>()?;
        let value = match self.next_occurrence(field_number, &[WireType::StartGroup])? {
            Some(Occurrence::Captured(UnknownValue::Group(group))) => {
                let mut staged = Vec::with_capacity(group.encoded_len());
                group.write_to(&mut BufEncoder::new(&mut staged))?;
                let child = self.reader.sub_reader_over(Bytes::from(staged))?;
                Some(delegate.read(child)?)
            }
            Some(Occurrence::Captured(other)) => {
                return Err(Error::InvalidWireType {
                    value: other.wire_type().into_val(),
                })
            }
            Some(Occurrence::Wire(_)) => {
                let end = make_tag(field_number, WireType::EndGroup);
                let child = self.reader.nested()?;
                Some(delegate.read_until(child, end)?)
            }
            None => None,
        };
        if value.is_none() {
            self.check_present(field_number)?;
        }
        Ok(value)
    }

    /// Capture the remainder of the message, then check required fields.
    pub(crate) fn finish(&mut self) -> Result<()> {
        self.drain()?;
        if self.end_tag != 0 {
            self.reader.check_last_tag_was(self.end_tag)?;
        }
        for field in self.descriptor.required_fields() {
            let number = field.number();
            if !self.seen.contains(number) && !self.holds_unknown(number) {
                return Err(Error::RequiredFieldMissing {
                    type_name: Arc::clone(self.descriptor.full_name()),
                    field: number,
                });
            }
        }
        Ok(())
    }

    fn claim(&mut self, field_number: u32) -> Result<()> {
        if !self.descriptor.has_field(field_number) {
            return Err(Error::UnknownField {
                type_name: Arc::clone(self.descriptor.full_name()),
                field: field_number,
            });
        }
        if !self.seen.insert(field_number) {
            return Err(Error::DuplicateField {
                type_name: Arc::clone(self.descriptor.full_name()),
                field: field_number,
            });
        }
        Ok(())
    }

    /// Fail if a required field turned out to be absent.
    fn check_present(&self, field_number: u32) -> Result<()> {
        let required = self
            .descriptor
            .field(field_number)
            .is_some_and(|field| field.is_required());
        if required && !self.holds_unknown(field_number) {
            return Err(Error::RequiredFieldMissing {
                type_name: Arc::clone(self.descriptor.full_name()),
                field: field_number,
            });
        }
        Ok(())
    }

    /// Whether the field's bytes arrived as an unknown occurrence, kept or taken.
    fn holds_unknown(&self, field_number: u32) -> bool {
        self.unknown.contains_field(field_number) || self.taken.contains(field_number)
    }

    /// Find the next occurrence of `field_number` with one of `wire_types`,
    /// captured ones first.
    fn next_occurrence(
        &mut self,
        field_number: u32,
        wire_types: &[WireType],
    ) -> Result<Option<Occurrence>> {
        if let Some(value) = self.unknown.consume_field(field_number, wire_types) {
            return Ok(Some(Occurrence::Captured(value)));
        }
        if self.exhausted {
            return Ok(None);
        }
        loop {
            let tag = self.reader.read_tag()?;
            if tag == 0 || tag == self.end_tag {
                self.exhausted = true;
                return Ok(None);
            }
            if let Some(wire_type) = wire_types
                .iter()
                .copied()
                .find(|wire_type| make_tag(field_number, *wire_type) == tag)
            {
                return Ok(Some(Occurrence::Wire(wire_type)));
            }
            if !self.unknown.read_single_field(tag, &mut self.reader)? {
                // An END_GROUP that doesn't close us.
                return Err(Error::TagMismatch {
                    expected: self.end_tag,
                    actual: tag,
                });
            }
        }
    }

    fn drain(&mut self) -> Result<()> {
        self.next_occurrence(0, &[]).map(|_| ())
    }

    fn collect_repeated<T>(
        &mut self,
        field_number: u32,
        wire_type: WireType,
        packable: bool,
        read: fn(&mut dyn Decoder) -> Result<T>,
        convert: fn(UnknownValue) -> Result<T>,
    ) -> Result<Vec<T>> {
        let both = [wire_type, WireType::LengthDelimited];
        let wire_types = if packable { &both[..] } else { &both[..1] };
        let is_packed = |found: WireType| packable && found == WireType::LengthDelimited;

        let mut out = Vec::new();
        while let Some(occurrence) = self.next_occurrence(field_number, wire_types)? {
            match occurrence {
                Occurrence::Captured(value) if is_packed(value.wire_type()) => {
                    unpack_captured(Bytes::from_unknown(value)?, read, &mut out)?;
                }
                Occurrence::Captured(value) => out.push(convert(value)?),
                Occurrence::Wire(found) if is_packed(found) => {
                    read_packed_run(&mut self.reader, read, &mut out)?;
                }
                Occurrence::Wire(_) => out.push(read(&mut self.reader)?),
            }
        }
        Ok(out)
    }

    fn next_message<T: 'static>(
        &mut self,
        field_number: u32,
        delegate: &MessageDelegate<T>,
    ) -> Result<Option<T>> {
        match self.next_occurrence(field_number, &[WireType::LengthDelimited])? {
            Some(Occurrence::Captured(value)) => {
                let child = self.reader.sub_reader_over(Bytes::from_unknown(value)?)?;
                delegate.read(child).map(Some)
            }
            Some(Occurrence::Wire(_)) => self
                .reader
                .read_nested(|child| delegate.read(child))
                .map(Some),
            None => Ok(None),
        }
    }

    #[allow(clippy::as_conversions)]
    fn preserve_undefined<E: 'static>(&mut self, delegate: &EnumDelegate<E>, field_number: u32, number: i32) {
        tracing::debug!(
            enum_type = %delegate.type_name(),
            field_number,
            number,
            "preserving undefined enum value as unknown field"
        );
        // Sign-extended like any other int32 varint.
        self.unknown.put_varint_field(field_number, i64::from(number) as u64);
    }
}

/// Encoding state for one message or group.
#[derive(Debug)]
pub struct WriteContext<'a> {
    writer: TagWriter<'a>,
    descriptor: Arc<MessageDescriptor>,
    seen: FieldSet,
    unknown: UnknownFieldSet,
}

impl<'a> WriteContext<'a> {
    pub(crate) fn new(writer: TagWriter<'a>, descriptor: Arc<MessageDescriptor>) -> Self {
        WriteContext {
            writer,
            descriptor,
            seen: FieldSet::default(),
            unknown: UnknownFieldSet::new(),
        }
    }

    pub fn type_name(&self) -> &Arc<str> {
        self.descriptor.full_name()
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// The underlying writer, for marshallers that drive the wire directly.
    pub fn writer(&mut self) -> &mut TagWriter<'a> {
        &mut self.writer
    }

    pub fn param<T: Any>(&self, key: &str) -> Option<&T> {
        self.writer.param(key)
    }

    pub fn set_param<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.writer.set_param(key, value);
    }

    pub fn write<T: Scalar>(&mut self, field_number: u32, value: &T) -> Result<()> {
        self.claim(field_number)?;
        value.write_field(field_number, &mut self.writer)
    }

    /// Write an optional field, `None` writes nothing but fails for required fields.
    pub fn write_opt<T: Scalar>(&mut self, field_number: u32, value: Option<&T>) -> Result<()> {
        self.claim(field_number)?;
        match value {
            Some(value) => value.write_field(field_number, &mut self.writer),
            None => self.check_not_null(field_number),
        }
    }

    /// Write each value as its own tagged occurrence.
    pub fn write_repeated<T: Scalar>(&mut self, field_number: u32, values: &[T]) -> Result<()> {
        self.claim(field_number)?;
        if values.is_empty() {
            return self.check_not_null(field_number);
        }
        for value in values {
            value.write_field(field_number, &mut self.writer)?;
        }
        Ok(())
    }

    /// Write all values as one packed, length-delimited run.
    ///
    /// Length-delimited types can't be packed and are written unpacked.
    pub fn write_packed<T: Scalar>(&mut self, field_number: u32, values: &[T]) -> Result<()> {
        self.claim(field_number)?;
        if values.is_empty() {
            return self.check_not_null(field_number);
        }
        if !T::PACKABLE {
            for value in values {
                value.write_field(field_number, &mut self.writer)?;
            }
            return Ok(());
        }
        let len = values.iter().map(Scalar::encoded_len).sum();
        self.writer.write_length_delimited_field(field_number, len)?;
        for value in values {
            value.write_value(&mut self.writer)?;
        }
        Ok(())
    }

    pub fn write_message<T: 'static>(&mut self, field_number: u32, value: &T) -> Result<()> {
        self.claim(field_number)?;
        let delegate = self.writer.registry().get_marshaller_delegate::<T>()?;
        self.writer
            .write_nested(field_number, |child| delegate.write(child, value))
    }

    pub fn write_message_opt<T: 'static>(&mut self, field_number: u32, value: Option<&T>) -> Result<()> {
        match value {
            Some(value) => self.write_message(field_number, value),
            None => {
                self.claim(field_number)?;
                self.check_not_null(field_number)
            }
        }
    }

    pub fn write_repeated_messages<T: 'static>(&mut self, field_number: u32, values: &[T]) -> Result<()> {
        self.claim(field_number)?;
        if values.is_empty() {
            return self.check_not_null(field_number);
        }
        let delegate = self.writer.registry().get_marshaller_delegate::<T>()?;
        for value in values {
            self.writer
                .write_nested(field_number, |child| delegate.write(child, value))?;
        }
        Ok(())
    }

    /// Write an enum field, failing for values the enum doesn't define.
    pub fn write_enum<E: 'static>(&mut self, field_number: u32, value: &E) -> Result<()> {
        self.claim(field_number)?;
        let delegate = self.writer.registry().get_enum_delegate::<E>()?;
        let number = delegate.encode(value)?;
        self.writer.write_enum_field(field_number, number)
    }

    pub fn write_enum_opt<E: 'static>(&mut self, field_number: u32, value: Option<&E>) -> Result<()> {
        match value {
            Some(value) => self.write_enum(field_number, value),
            None => {
                self.claim(field_number)?;
                self.check_not_null(field_number)
            }
        }
    }

    pub fn write_repeated_enums<E: 'static>(&mut self, field_number: u32, values: &[E]) -> Result<()> {
        self.claim(field_number)?;
        if values.is_empty() {
            return self.check_not_null(field_number);
        }
        let delegate = self.writer.registry().get_enum_delegate::<E>()?;
        for value in values {
            let number = delegate.encode(value)?;
            self.writer.write_enum_field(field_number, number)?;
        }
        Ok(())
    }

    pub fn write_group<T: 'static>(&mut self, field_number: u32, value: &T) -> Result<()> {
        self.claim(field_number)?;
        let delegate = self.writer.registry().get_marshaller_delegate::<T>()?;
        self.writer
            .write_group(field_number, |child| delegate.write(child, value))
    }

    /// Attach unknown fields to be emitted after every declared field.
    pub fn write_unknown_fields(&mut self, fields: &UnknownFieldSet) {
        self.unknown.merge_from(fields.clone());
    }

    /// Check required fields, then emit the attached unknown fields.
    pub(crate) fn finish(&mut self) -> Result<()> {
        for field in self.descriptor.required_fields() {
            let number = field.number();
            if !self.seen.contains(number) && !self.unknown.contains_field(number) {
                return Err(Error::RequiredFieldNull {
                    type_name: Arc::clone(self.descriptor.full_name()),
                    field: number,
                });
            }
        }
        self.unknown.write_to(&mut self.writer)
    }

    fn claim(&mut self, field_number: u32) -> Result<()> {
        if !self.descriptor.has_field(field_number) {
            return Err(Error::UnknownField {
                type_name: Arc::clone(self.descriptor.full_name()),
                field: field_number,
            });
        }
        if !self.seen.insert(field_number) {
            return Err(Error::DuplicateField {
                type_name: Arc::clone(self.descriptor.full_name()),
                field: field_number,
            });
        }
        Ok(())
    }

    fn check_not_null(&self, field_number: u32) -> Result<()> {
        let required = self
            .descriptor
            .field(field_number)
            .is_some_and(|field| field.is_required());
        if required {
            return Err(Error::RequiredFieldNull {
                type_name: Arc::clone(self.descriptor.full_name()),
                field: field_number,
            });
        }
        Ok(())
    }
}
