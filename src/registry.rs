//! Dispatch from a type to the marshaller that reads and writes it.
//!
//! Descriptors are registered first; registering a marshaller validates that a
//! descriptor of the right kind exists for its type name, then indexes the
//! resulting delegate by both name and [`TypeId`]. Lookups are concurrent and
//! lock-free for readers, so one [`Registry`] behind an `Arc` can serve every
//! thread.

use std::any::{Any, TypeId};
use std::io::{Read, Write};
use std::sync::Arc;

use bytes::Buf;
use dashmap::DashMap;

use crate::config::Config;
use crate::context::{Params, ReadContext, WriteContext};
use crate::decoder::{ArrayDecoder, BufDecoder, Decoder, StreamDecoder};
use crate::descriptor::{Descriptor, EnumDescriptor, MessageDescriptor};
use crate::encoder::{BufEncoder, CountingEncoder, Encoder, StreamEncoder};
use crate::error::{Error, Result};
use crate::tag_reader::TagReader;
use crate::tag_writer::TagWriter;

/// Reads and writes one message type.
///
/// Implementations issue field oriented calls against the context; the
/// context takes care of unknown fields, duplicate access and required fields.
pub trait MessageMarshaller: Send + Sync + 'static {
    type Target: 'static;

    /// Fully qualified name, must match a registered [`MessageDescriptor`].
    fn type_name(&self) -> &str;

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Self::Target>;

    fn write(&self, ctx: &mut WriteContext<'_>, value: &Self::Target) -> Result<()>;
}

/// Maps an enum type to and from its wire numbers.
pub trait EnumMarshaller: Send + Sync + 'static {
    type Target: 'static;

    /// Fully qualified name, must match a registered [`EnumDescriptor`].
    fn type_name(&self) -> &str;

    /// Returns `None` for numbers the enum doesn't define.
    fn decode(&self, number: i32) -> Option<Self::Target>;

    fn encode(&self, value: &Self::Target) -> i32;
}

/// A registered message marshaller together with its descriptor.
pub struct MessageDelegate<T: 'static> {
    marshaller: Box<dyn MessageMarshaller<Target = T>>,
    descriptor: Arc<MessageDescriptor>,
}

impl<T: 'static> core::fmt::Debug for MessageDelegate<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageDelegate")
            .field("type_name", self.descriptor.full_name())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> MessageDelegate<T> {
    pub fn type_name(&self) -> &Arc<str> {
        self.descriptor.full_name()
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    pub fn marshaller(&self) -> &dyn MessageMarshaller<Target = T> {
        self.marshaller.as_ref()
    }

    /// Read a whole message from `reader`, up to the end of its input or limit.
    pub fn read(&self, reader: TagReader<'_>) -> Result<T> {
        self.read_until(reader, 0)
    }

    pub(crate) fn read_until(&self, reader: TagReader<'_>, end_tag: u32) -> Result<T> {
        let mut ctx = ReadContext::new(reader, Arc::clone(&self.descriptor), end_tag);
        let value = self.marshaller.read(&mut ctx)?;
        ctx.finish()?;
        Ok(value)
    }

    /// Write a whole message to `writer`.
    pub fn write(&self, writer: TagWriter<'_>, value: &T) -> Result<()> {
        let mut ctx = WriteContext::new(writer, Arc::clone(&self.descriptor));
        self.marshaller.write(&mut ctx, value)?;
        ctx.finish()
    }
}

/// A [`MessageDelegate`] with its target type erased, for lookups by name.
pub trait AnyMessageDelegate: Send + Sync {
    fn type_name(&self) -> &Arc<str>;

    fn descriptor(&self) -> &Arc<MessageDescriptor>;

    /// [`TypeId`] of the marshalled type.
    fn target_type_id(&self) -> TypeId;

    fn read_any(&self, reader: TagReader<'_>) -> Result<Box<dyn Any>>;

    /// Fails with [`Error::ValueTypeMismatch`] if `value` isn't the marshalled type.
    fn write_any(&self, writer: TagWriter<'_>, value: &dyn Any) -> Result<()>;

    #[doc(hidden)]
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: 'static> AnyMessageDelegate for MessageDelegate<T> {
    fn type_name(&self) -> &Arc<str> {
        self.descriptor.full_name()
    }

    fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    fn target_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn read_any(&self, reader: TagReader<'_>) -> Result<Box<dyn Any>> {
        let value = self.read(reader)?;
        Ok(Box::new(value))
    }

    fn write_any(&self, writer: TagWriter<'_>, value: &dyn Any) -> Result<()> {
        let value = value
            .downcast_ref::<T>()
            .ok_or_else(|| Error::ValueTypeMismatch {
                type_name: Arc::clone(self.descriptor.full_name()),
                expected: core::any::type_name::<T>(),
            })?;
        self.write(writer, value)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A registered enum marshaller together with its descriptor.
pub struct EnumDelegate<E: 'static> {
    marshaller: Box<dyn EnumMarshaller<Target = E>>,
    descriptor: Arc<EnumDescriptor>,
}

impl<E: 'static> EnumDelegate<E> {
    pub fn type_name(&self) -> &Arc<str> {
        self.descriptor.full_name()
    }

    pub fn descriptor(&self) -> &Arc<EnumDescriptor> {
        &self.descriptor
    }

    /// Map a wire number to a value, `None` if the descriptor doesn't define it.
    pub fn decode(&self, number: i32) -> Option<E> {
        if !self.descriptor.is_defined(number) {
            return None;
        }
        self.marshaller.decode(number)
    }

    /// Map a value to its wire number.
    ///
    /// Encoding a number the descriptor doesn't define is a marshaller bug and
    /// fails with [`Error::UndefinedEnumValue`].
    pub fn encode(&self, value: &E) -> Result<i32> {
        let number = self.marshaller.encode(value);
        if !self.descriptor.is_defined(number) {
            return Err(Error::UndefinedEnumValue {
                type_name: Arc::clone(self.descriptor.full_name()),
                number,
            });
        }
        Ok(number)
    }
}

/// An [`EnumDelegate`] with its target type erased.
pub trait AnyEnumDelegate: Send + Sync {
    fn type_name(&self) -> &Arc<str>;

    fn descriptor(&self) -> &Arc<EnumDescriptor>;

    fn target_type_id(&self) -> TypeId;

    #[doc(hidden)]
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: 'static> AnyEnumDelegate for EnumDelegate<E> {
    fn type_name(&self) -> &Arc<str> {
        self.descriptor.full_name()
    }

    fn descriptor(&self) -> &Arc<EnumDescriptor> {
        &self.descriptor
    }

    fn target_type_id(&self) -> TypeId {
        TypeId::of::<E>()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Descriptors and marshallers, and the entry points that use them.
#[derive(Default)]
pub struct Registry {
    config: Config,
    descriptors: DashMap<Arc<str>, Descriptor>,
    messages_by_name: DashMap<Arc<str>, Arc<dyn AnyMessageDelegate>>,
    messages_by_type: DashMap<TypeId, Arc<dyn AnyMessageDelegate>>,
    enums_by_name: DashMap<Arc<str>, Arc<dyn AnyEnumDelegate>>,
    enums_by_type: DashMap<TypeId, Arc<dyn AnyEnumDelegate>>,
}

static_assertions::assert_impl_all!(Registry: Send, Sync);

impl Registry {
    pub fn new(config: Config) -> Self {
        Registry {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn register_message_descriptor(&self, descriptor: MessageDescriptor) {
        let name = Arc::clone(descriptor.full_name());
        tracing::debug!(type_name = %name, fields = descriptor.fields().count(), "registered message descriptor");
        self.descriptors
            .insert(name, Descriptor::Message(Arc::new(descriptor)));
    }

    pub fn register_enum_descriptor(&self, descriptor: EnumDescriptor) {
        let name = Arc::clone(descriptor.full_name());
        tracing::debug!(type_name = %name, "registered enum descriptor");
        self.descriptors
            .insert(name, Descriptor::Enum(Arc::new(descriptor)));
    }

    pub fn descriptor(&self, name: &str) -> Option<Descriptor> {
        self.descriptors.get(name).map(|entry| entry.value().clone())
    }

    /// Register a message marshaller, replacing any previous one for the same name.
    ///
    /// Fails if no [`MessageDescriptor`] is registered under its type name.
    pub fn register_message_marshaller<M: MessageMarshaller>(&self, marshaller: M) -> Result<()> {
        let name: Arc<str> = Arc::from(marshaller.type_name());
        let descriptor = match self.descriptor(&name) {
            Some(Descriptor::Message(descriptor)) => descriptor,
            Some(Descriptor::Enum(_)) => return Err(Error::DescriptorKindMismatch { name }),
            None => return Err(Error::MissingDescriptor { name }),
        };

        let delegate: Arc<dyn AnyMessageDelegate> = Arc::new(MessageDelegate {
            marshaller: Box::new(marshaller),
            descriptor,
        });
        let type_id = TypeId::of::<M::Target>();
        if let Some(previous) = self
            .messages_by_name
            .insert(Arc::clone(&name), Arc::clone(&delegate))
        {
            if previous.target_type_id() != type_id {
                self.messages_by_type.remove(&previous.target_type_id());
            }
        }
        self.messages_by_type.insert(type_id, delegate);
        tracing::debug!(type_name = %name, rust_type = core::any::type_name::<M::Target>(), "registered message marshaller");
        Ok(())
    }

    /// Register an enum marshaller, replacing any previous one for the same name.
    ///
    /// Fails if no [`EnumDescriptor`] is registered under its type name, or if
    /// the marshaller can't decode one of the descriptor's values.
    pub fn register_enum_marshaller<M: EnumMarshaller>(&self, marshaller: M) -> Result<()> {
        let name: Arc<str> = Arc::from(marshaller.type_name());
        let descriptor = match self.descriptor(&name) {
            Some(Descriptor::Enum(descriptor)) => descriptor,
            Some(Descriptor::Message(_)) => return Err(Error::DescriptorKindMismatch { name }),
            None => return Err(Error::MissingDescriptor { name }),
        };
        if let Some((number, value)) = descriptor
            .values()
            .find(|(number, _)| marshaller.decode(*number).is_none())
        {
            return Err(Error::InvalidDescriptor {
                name,
                reason: format!("marshaller can't decode {value} = {number}"),
            });
        }

        let delegate: Arc<dyn AnyEnumDelegate> = Arc::new(EnumDelegate {
            marshaller: Box::new(marshaller),
            descriptor,
        });
        let type_id = TypeId::of::<M::Target>();
        if let Some(previous) = self
            .enums_by_name
            .insert(Arc::clone(&name), Arc::clone(&delegate))
        {
            if previous.target_type_id() != type_id {
                self.enums_by_type.remove(&previous.target_type_id());
            }
        }
        self.enums_by_type.insert(type_id, delegate);
        tracing::debug!(type_name = %name, rust_type = core::any::type_name::<M::Target>(), "registered enum marshaller");
        Ok(())
    }

    /// Returns `true` if a message or enum marshaller is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.messages_by_name.contains_key(name) || self.enums_by_name.contains_key(name)
    }

    pub fn get_marshaller_delegate<T: 'static>(&self) -> Result<Arc<MessageDelegate<T>>> {
        let unknown = || Error::UnknownType {
            name: Arc::from(core::any::type_name::<T>()),
        };
        let delegate = self
            .messages_by_type
            .get(&TypeId::of::<T>())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(unknown)?;
        delegate
            .into_any()
            .downcast::<MessageDelegate<T>>()
            .map_err(|_| unknown())
    }

    pub fn get_marshaller_delegate_by_name(&self, name: &str) -> Result<Arc<dyn AnyMessageDelegate>> {
        self.messages_by_name
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownType {
                name: Arc::from(name),
            })
    }

    pub fn get_enum_delegate<E: 'static>(&self) -> Result<Arc<EnumDelegate<E>>> {
        let unknown = || Error::UnknownType {
            name: Arc::from(core::any::type_name::<E>()),
        };
        let delegate = self
            .enums_by_type
            .get(&TypeId::of::<E>())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(unknown)?;
        delegate
            .into_any()
            .downcast::<EnumDelegate<E>>()
            .map_err(|_| unknown())
    }

    pub fn get_enum_delegate_by_name(&self, name: &str) -> Result<Arc<dyn AnyEnumDelegate>> {
        self.enums_by_name
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownType {
                name: Arc::from(name),
            })
    }

    /// Encode `value` into a fresh `Vec`.
    pub fn to_bytes<T: 'static>(&self, value: &T) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(value, &mut BufEncoder::new(&mut out), None)?;
        Ok(out)
    }

    /// Encode `value` into `writer` through a buffered [`StreamEncoder`], then flush it.
    pub fn to_writer<T: 'static, W: Write>(&self, value: &T, writer: W) -> Result<()> {
        let mut encoder = StreamEncoder::with_capacity(writer, self.config.stream_buffer_size);
        self.write_to(value, &mut encoder, None)?;
        encoder.flush()
    }

    /// Encode `value` into any [`Encoder`], optionally with caller supplied parameters.
    pub fn write_to<T: 'static>(
        &self,
        value: &T,
        encoder: &mut dyn Encoder,
        params: Option<&Params<'_>>,
    ) -> Result<()> {
        let delegate = self.get_marshaller_delegate::<T>()?;
        let writer = match params {
            Some(params) => TagWriter::with_params(encoder, self, params),
            None => TagWriter::new(encoder, self),
        };
        delegate.write(writer, value)
    }

    /// Exact encoded size of `value`.
    pub fn compute_size<T: 'static>(&self, value: &T) -> Result<u64> {
        let mut counter = CountingEncoder::new();
        self.write_to(value, &mut counter, None)?;
        Ok(counter.position())
    }

    pub fn from_slice<T: 'static>(&self, data: &[u8]) -> Result<T> {
        let mut decoder = ArrayDecoder::new(data);
        if let Some(limit) = self.config.global_limit {
            decoder.set_global_limit(limit);
        }
        self.read_from(&mut decoder, None)
    }

    /// Decode from any [`Buf`], `bytes` fields are zero-copy when `B` is [`bytes::Bytes`].
    pub fn from_buf<T: 'static, B: Buf>(&self, buf: B) -> Result<T> {
        let mut decoder = BufDecoder::new(buf);
        if let Some(limit) = self.config.global_limit {
            decoder.set_global_limit(limit);
        }
        self.read_from(&mut decoder, None)
    }

    /// Decode one message spanning the rest of `reader`.
    pub fn from_reader<T: 'static, R: Read>(&self, reader: R) -> Result<T> {
        let mut decoder = StreamDecoder::with_capacity(reader, self.config.stream_buffer_size);
        if let Some(limit) = self.config.stream_global_limit {
            decoder.set_global_limit(limit);
        }
        self.read_from(&mut decoder, None)
    }

    /// Decode from any [`Decoder`], optionally with caller supplied parameters.
    pub fn read_from<T: 'static>(
        &self,
        decoder: &mut dyn Decoder,
        params: Option<&Params<'_>>,
    ) -> Result<T> {
        let delegate = self.get_marshaller_delegate::<T>()?;
        let reader = match params {
            Some(params) => TagReader::with_params(decoder, self, params),
            None => TagReader::new(decoder, self),
        };
        delegate.read(reader)
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("descriptors", &self.descriptors.len())
            .field("messages", &self.messages_by_name.len())
            .field("enums", &self.enums_by_name.len())
            .finish()
    }
}
