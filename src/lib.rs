//! A protobuf compatible binary codec built around marshallers.
//!
//! The crate has three layers:
//!
//! * [`decoder`] and [`encoder`]: the wire primitives over slices, [`bytes`]
//!   buffers, and `std::io` streams.
//! * [`TagReader`]/[`TagWriter`] and [`UnknownFieldSet`]: tag driven streaming
//!   on top of those primitives, keeping fields the reader doesn't know about.
//! * [`Registry`]: descriptors and marshallers, with [`ReadContext`] and
//!   [`WriteContext`] enforcing required fields and single access per field.
//!
//! ```
//! use tagwire::{
//!     FieldDescriptor, MessageDescriptor, MessageMarshaller, ReadContext, Registry, Result,
//!     WireType, WriteContext,
//! };
//!
//! #[derive(Debug, PartialEq)]
//! struct Ping {
//!     seq: u64,
//! }
//!
//! struct PingMarshaller;
//!
//! impl MessageMarshaller for PingMarshaller {
//!     type Target = Ping;
//!
//!     fn type_name(&self) -> &str {
//!         "demo.Ping"
//!     }
//!
//!     fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Ping> {
//!         Ok(Ping { seq: ctx.read(1)?.unwrap_or_default() })
//!     }
//!
//!     fn write(&self, ctx: &mut WriteContext<'_>, value: &Ping) -> Result<()> {
//!         ctx.write(1, &value.seq)
//!     }
//! }
//!
//! let registry = Registry::default();
//! registry.register_message_descriptor(
//!     MessageDescriptor::builder("demo.Ping")
//!         .field(FieldDescriptor::new(1, "seq", WireType::Varint))
//!         .build()?,
//! );
//! registry.register_message_marshaller(PingMarshaller)?;
//!
//! let bytes = registry.to_bytes(&Ping { seq: 150 })?;
//! assert_eq!(bytes, [0x08, 0x96, 0x01]);
//! assert_eq!(registry.from_slice::<Ping>(&bytes)?, Ping { seq: 150 });
//! # Ok::<(), tagwire::Error>(())
//! ```

#![deny(clippy::as_conversions)]

pub mod codec;
pub mod config;
pub mod context;
pub mod decoder;
pub mod descriptor;
pub mod encoder;
pub mod error;
// Publically export `leb128` because the functions are useful on their own.
pub mod leb128;
pub mod registry;
pub mod tag_reader;
pub mod tag_writer;
pub mod unknown;
pub mod wire;

mod util;

pub use codec::{Fixed32, Fixed64, Scalar, Sfixed32, Sfixed64, Sint32, Sint64};
pub use config::Config;
pub use context::{Params, ReadContext, WriteContext};
pub use decoder::Decoder;
pub use descriptor::{Descriptor, EnumDescriptor, FieldDescriptor, MessageDescriptor};
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use registry::{
    AnyEnumDelegate, AnyMessageDelegate, EnumDelegate, EnumMarshaller, MessageDelegate,
    MessageMarshaller, Registry,
};
pub use tag_reader::TagReader;
pub use tag_writer::TagWriter;
pub use unknown::{UnknownFieldSet, UnknownValue};
pub use wire::WireType;
