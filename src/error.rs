//! Errors produced while encoding, decoding, or dispatching marshallers.
//!
//! Errors fall into three families:
//!
//! * Wire errors: the bytes themselves are bad (`MalformedVarint`, `MessageTruncated`, ...).
//! * Schema violations: the bytes are fine but the message breaks its contract,
//!   e.g. a required field is absent.
//! * Configuration and programming errors: an unregistered type, a marshaller that
//!   touches the same field twice.
//!
//! None of them are retried by this crate.

use std::sync::Arc;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Why a tag was rejected by [`crate::wire::tag_field_number`] or `read_tag`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvalidTagReason {
    /// The tag's varint did not fit in 32 bits.
    Overflow,
    /// Field number 0 is reserved.
    ZeroFieldNumber,
}

impl core::fmt::Display for InvalidTagReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InvalidTagReason::Overflow => f.write_str("tag does not fit in 32 bits"),
            InvalidTagReason::ZeroFieldNumber => f.write_str("field number must be at least 1"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed varint: no terminating byte within 10 bytes")]
    MalformedVarint,
    #[error("negative length prefix: {length}")]
    NegativeLength { length: i32 },
    #[error("invalid 'wire type' value: {value}")]
    InvalidWireType { value: u8 },
    #[error("invalid tag {tag:#x}: {reason}")]
    InvalidTag { tag: u64, reason: InvalidTagReason },
    #[error("tag mismatch: expected {expected:#x}, last tag read was {actual:#x}")]
    TagMismatch { expected: u32, actual: u32 },
    #[error("message nesting exceeds the configured depth of {limit}")]
    NestingTooDeep { limit: usize },
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
    #[error("message truncated: input ended before the declared length was satisfied")]
    MessageTruncated,
    #[error("global read limit of {limit} bytes exceeded")]
    GlobalLimitExceeded { limit: u64 },
    #[error("required field {field} of '{type_name}' is missing")]
    RequiredFieldMissing { type_name: Arc<str>, field: u32 },
    #[error("required field {field} of '{type_name}' was not written")]
    RequiredFieldNull { type_name: Arc<str>, field: u32 },
    #[error("field {field} of '{type_name}' was accessed more than once")]
    DuplicateField { type_name: Arc<str>, field: u32 },
    #[error("field {field} is not declared by '{type_name}'")]
    UnknownField { type_name: Arc<str>, field: u32 },
    #[error("no marshaller registered for type '{name}'")]
    UnknownType { name: Arc<str> },
    #[error("no descriptor registered for type '{name}'")]
    MissingDescriptor { name: Arc<str> },
    #[error("descriptor for '{name}' is not of the kind the marshaller expects")]
    DescriptorKindMismatch { name: Arc<str> },
    #[error("invalid descriptor '{name}': {reason}")]
    InvalidDescriptor { name: Arc<str>, reason: String },
    #[error("value {number} is not defined by enum '{type_name}'")]
    UndefinedEnumValue { type_name: Arc<str>, number: i32 },
    #[error("out of space: needed {needed} bytes but only {remaining} remain")]
    OutOfSpace { needed: usize, remaining: usize },
    #[error("length-delimited payload of {len} bytes exceeds the 2 GiB wire limit")]
    LengthTooLarge { len: usize },
    #[error("marshaller for '{type_name}' expects a value of type {expected}")]
    ValueTypeMismatch { type_name: Arc<str>, expected: &'static str },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the error was caused by bytes that do not form valid
    /// protobuf, as opposed to a schema or configuration problem.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::MalformedVarint
                | Error::NegativeLength { .. }
                | Error::InvalidWireType { .. }
                | Error::InvalidTag { .. }
                | Error::TagMismatch { .. }
                | Error::NestingTooDeep { .. }
                | Error::InvalidUtf8
                | Error::MessageTruncated
                | Error::GlobalLimitExceeded { .. }
        )
    }

    /// Returns `true` if the bytes were well formed but broke the message contract.
    pub fn is_schema_violation(&self) -> bool {
        matches!(
            self,
            Error::RequiredFieldMissing { .. }
                | Error::RequiredFieldNull { .. }
                | Error::DuplicateField { .. }
                | Error::UnknownField { .. }
        )
    }

    #[cold]
    pub(crate) fn invalid_tag(tag: u64, reason: InvalidTagReason) -> Self {
        Error::InvalidTag { tag, reason }
    }

    #[cold]
    pub(crate) fn truncated() -> Self {
        Error::MessageTruncated
    }
}
