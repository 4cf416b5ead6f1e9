//! Schema metadata for messages and enums.
//!
//! Descriptors are supplied by whatever produces the marshallers (a schema
//! compiler, hand written code, ...) and registered before the marshallers
//! that rely on them. The core only needs field numbers, wire types and which
//! fields are required; names are carried for error messages.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::wire::{self, make_tag, WireType};

/// A single declared field of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    number: u32,
    name: String,
    wire_type: WireType,
    required: bool,
    repeated: bool,
}

impl FieldDescriptor {
    pub fn new(number: u32, name: impl Into<String>, wire_type: WireType) -> Self {
        FieldDescriptor {
            number,
            name: name.into(),
            wire_type,
            required: false,
            repeated: false,
        }
    }

    /// Mark the field `required`, it must be present in every message.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    /// The tag an unpacked occurrence of this field carries.
    pub fn tag(&self) -> u32 {
        make_tag(self.number, self.wire_type)
    }
}

/// The declared shape of a message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    full_name: Arc<str>,
    fields: BTreeMap<u32, FieldDescriptor>,
}

impl MessageDescriptor {
    pub fn builder(full_name: impl Into<Arc<str>>) -> MessageDescriptorBuilder {
        MessageDescriptorBuilder {
            full_name: full_name.into(),
            fields: Vec::new(),
        }
    }

    /// Fully qualified name, e.g. `demo.Person`.
    pub fn full_name(&self) -> &Arc<str> {
        &self.full_name
    }

    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.get(&number)
    }

    pub fn has_field(&self, number: u32) -> bool {
        self.fields.contains_key(&number)
    }

    /// Declared fields in ascending field number order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> + '_ {
        self.fields.values()
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDescriptor> + '_ {
        self.fields.values().filter(|field| field.required)
    }
}

/// Builder for a [`MessageDescriptor`], validated by [`MessageDescriptorBuilder::build`].
#[derive(Debug, Clone)]
pub struct MessageDescriptorBuilder {
    full_name: Arc<str>,
    fields: Vec<FieldDescriptor>,
}

impl MessageDescriptorBuilder {
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<MessageDescriptor> {
        let invalid = |reason: String| Error::InvalidDescriptor {
            name: Arc::clone(&self.full_name),
            reason,
        };
        if self.full_name.is_empty() {
            return Err(invalid("empty type name".to_owned()));
        }

        let mut fields = BTreeMap::new();
        let mut names = BTreeSet::new();
        for field in &self.fields {
            if !wire::is_valid_field_number(field.number) {
                return Err(invalid(format!("field number {} is out of range", field.number)));
            }
            if field.wire_type == WireType::EndGroup {
                return Err(invalid(format!("field {} declared as END_GROUP", field.number)));
            }
            if field.required && field.repeated {
                return Err(invalid(format!("field {} is both required and repeated", field.number)));
            }
            if !names.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field name '{}'", field.name)));
            }
            if fields.insert(field.number, field.clone()).is_some() {
                return Err(invalid(format!("duplicate field number {}", field.number)));
            }
        }

        Ok(MessageDescriptor {
            full_name: self.full_name,
            fields,
        })
    }
}

/// The declared values of an enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    full_name: Arc<str>,
    values: BTreeMap<i32, String>,
}

impl EnumDescriptor {
    pub fn builder(full_name: impl Into<Arc<str>>) -> EnumDescriptorBuilder {
        EnumDescriptorBuilder {
            full_name: full_name.into(),
            values: Vec::new(),
        }
    }

    pub fn full_name(&self) -> &Arc<str> {
        &self.full_name
    }

    /// Returns `true` if `number` is one of the declared values.
    pub fn is_defined(&self, number: i32) -> bool {
        self.values.contains_key(&number)
    }

    pub fn value_name(&self, number: i32) -> Option<&str> {
        self.values.get(&number).map(String::as_str)
    }

    /// Declared `(number, name)` pairs in ascending number order.
    pub fn values(&self) -> impl Iterator<Item = (i32, &str)> + '_ {
        self.values.iter().map(|(number, name)| (*number, name.as_str()))
    }
}

/// Builder for an [`EnumDescriptor`].
#[derive(Debug, Clone)]
pub struct EnumDescriptorBuilder {
    full_name: Arc<str>,
    values: Vec<(i32, String)>,
}

impl EnumDescriptorBuilder {
    pub fn value(mut self, number: i32, name: impl Into<String>) -> Self {
        self.values.push((number, name.into()));
        self
    }

    pub fn build(self) -> Result<EnumDescriptor> {
        let invalid = |reason: String| Error::InvalidDescriptor {
            name: Arc::clone(&self.full_name),
            reason,
        };
        if self.full_name.is_empty() {
            return Err(invalid("empty type name".to_owned()));
        }
        if self.values.is_empty() {
            return Err(invalid("enum declares no values".to_owned()));
        }

        let mut values = BTreeMap::new();
        for (number, name) in &self.values {
            if values.insert(*number, name.clone()).is_some() {
                return Err(invalid(format!("duplicate enum number {number}")));
            }
        }

        Ok(EnumDescriptor {
            full_name: self.full_name,
            values,
        })
    }
}

/// Either kind of descriptor, as stored by the registry.
#[derive(Debug, Clone)]
pub enum Descriptor {
    Message(Arc<MessageDescriptor>),
    Enum(Arc<EnumDescriptor>),
}

impl Descriptor {
    pub fn full_name(&self) -> &Arc<str> {
        match self {
            Descriptor::Message(message) => message.full_name(),
            Descriptor::Enum(enumeration) => enumeration.full_name(),
        }
    }
}
