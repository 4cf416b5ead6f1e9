//! The streaming, tag driven write API, mirror of [`crate::TagReader`].

use std::any::Any;

use crate::context::Params;
use crate::encoder::{BufEncoder, Encoder, MAX_ATOMIC_WRITE};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::wire::WireType;

/// Writes tags and values for one message level.
///
/// Implements [`Encoder`], so every `write_*_field` helper is available on it.
pub struct TagWriter<'a> {
    encoder: &'a mut dyn Encoder,
    registry: &'a Registry,
    params: Params<'a>,
    depth: usize,
}

impl<'a> TagWriter<'a> {
    pub fn new(encoder: &'a mut dyn Encoder, registry: &'a Registry) -> Self {
        TagWriter {
            encoder,
            registry,
            params: Params::new(),
            depth: 0,
        }
    }

    /// A top level writer whose parameter lookups fall back to `params`.
    pub fn with_params(
        encoder: &'a mut dyn Encoder,
        registry: &'a Registry,
        params: &'a Params<'a>,
    ) -> Self {
        TagWriter {
            encoder,
            registry,
            params: Params::scoped(params),
            depth: 0,
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn params(&self) -> &Params<'a> {
        &self.params
    }

    pub fn param<T: Any>(&self, key: &str) -> Option<&T> {
        self.params.get(key)
    }

    pub fn set_param<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.params.set(key, value);
    }

    fn child_depth(&self) -> Result<usize> {
        let limit = self.registry.config().get_max_nesting_depth();
        if self.depth >= limit {
            return Err(Error::NestingTooDeep { limit });
        }
        Ok(self.depth + 1)
    }

    /// Write a length-delimited embedded message produced by `f`.
    ///
    /// The message is staged into a temporary buffer so its length prefix is
    /// exact, then framed into this writer.
    pub fn write_nested(
        &mut self,
        field_number: u32,
        f: impl FnOnce(TagWriter<'_>) -> Result<()>,
    ) -> Result<()> {
        let depth = self.child_depth()?;
        tracing::trace!(depth, field_number, "entering nested frame");
        let mut staged = Vec::new();
        {
            let mut encoder = BufEncoder::new(&mut staged);
            f(TagWriter {
                encoder: &mut encoder,
                registry: self.registry,
                params: Params::scoped(&self.params),
                depth,
            })?;
        }
        self.write_bytes_field(field_number, &staged)
    }

    /// Write a START_GROUP/END_GROUP delimited group produced by `f`.
    ///
    /// Groups have no length prefix, so `f` writes straight into this writer's encoder.
    pub fn write_group(
        &mut self,
        field_number: u32,
        f: impl FnOnce(TagWriter<'_>) -> Result<()>,
    ) -> Result<()> {
        let depth = self.child_depth()?;
        self.ensure_room(MAX_ATOMIC_WRITE)?;
        self.write_tag(field_number, WireType::StartGroup)?;
        f(TagWriter {
            encoder: &mut *self.encoder,
            registry: self.registry,
            params: Params::scoped(&self.params),
            depth,
        })?;
        self.write_tag(field_number, WireType::EndGroup)
    }

    /// Write `value` as a whole message of type `T`.
    pub fn write_message<T: 'static>(self, value: &T) -> Result<()> {
        let delegate = self.registry.get_marshaller_delegate::<T>()?;
        delegate.write(self, value)
    }
}

impl Encoder for TagWriter<'_> {
    #[inline]
    fn position(&self) -> u64 {
        self.encoder.position()
    }

    fn write_raw_byte(&mut self, byte: u8) -> Result<()> {
        self.encoder.write_raw_byte(byte)
    }

    fn write_raw_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.encoder.write_raw_bytes(bytes)
    }

    fn ensure_room(&mut self, len: usize) -> Result<()> {
        self.encoder.ensure_room(len)
    }

    fn flush(&mut self) -> Result<()> {
        self.encoder.flush()
    }

    #[inline]
    fn write_varint64(&mut self, value: u64) -> Result<()> {
        self.encoder.write_varint64(value)
    }
}

impl core::fmt::Debug for TagWriter<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TagWriter")
            .field("position", &self.position())
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{ArrayDecoder, Decoder};
    use crate::encoder::StreamEncoder;
    use crate::Config;

    #[test]
    fn test_write_nested_frames_exactly() {
        let registry = Registry::default();
        let mut out = Vec::new();
        let mut encoder = BufEncoder::new(&mut out);
        let mut writer = TagWriter::new(&mut encoder, &registry);
        writer.write_uint32_field(1, 7).unwrap();
        writer
            .write_nested(2, |mut child| {
                assert_eq!(child.depth(), 1);
                child.write_string_field(1, "inner")
            })
            .unwrap();
        writer.write_uint32_field(3, 9).unwrap();

        assert_eq!(
            out,
            [0x08, 0x07, 0x12, 0x07, 0x0A, 0x05, b'i', b'n', b'n', b'e', b'r', 0x18, 0x09]
        );
    }

    #[test]
    fn test_write_group() {
        let registry = Registry::default();
        let mut out = Vec::new();
        let mut encoder = BufEncoder::new(&mut out);
        let mut writer = TagWriter::new(&mut encoder, &registry);
        writer
            .write_group(3, |mut child| child.write_bool_field(1, true))
            .unwrap();
        assert_eq!(out, [0x1B, 0x08, 0x01, 0x1C]);

        let mut dec = ArrayDecoder::new(&out);
        let tag = dec.read_tag().unwrap();
        assert!(dec.skip_field(tag).unwrap());
        assert_eq!(dec.read_tag().unwrap(), 0);
    }

    #[test]
    fn test_params_flow_to_children() {
        let registry = Registry::default();
        let mut out = Vec::new();
        let mut encoder = BufEncoder::new(&mut out);
        let mut writer = TagWriter::new(&mut encoder, &registry);
        writer.set_param("version", 3u32);
        writer
            .write_nested(1, |child| {
                assert_eq!(child.param::<u32>("version"), Some(&3));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let mut config = Config::new();
        config.max_nesting_depth(1);
        let registry = Registry::new(config);
        let mut encoder = BufEncoder::new(Vec::new());
        let mut writer = TagWriter::new(&mut encoder, &registry);
        let result = writer.write_nested(1, |mut child| child.write_nested(1, |_| Ok(())));
        assert!(matches!(result, Err(Error::NestingTooDeep { limit: 1 })));
    }

    #[test]
    fn test_flush_reaches_sink() {
        let registry = Registry::default();
        let mut sink = Vec::new();
        let mut encoder = StreamEncoder::new(&mut sink);
        let mut writer = TagWriter::new(&mut encoder, &registry);
        writer.write_sint32_field(1, -1).unwrap();
        writer.flush().unwrap();
        drop(writer);
        drop(encoder);
        assert_eq!(sink, [0x08, 0x01]);
    }
}
