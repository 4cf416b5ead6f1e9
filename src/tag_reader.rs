//! The streaming, tag driven read API.
//!
//! A [`TagReader`] wraps a [`Decoder`] together with the [`Registry`] used to
//! resolve nested types, a [`Params`] scope, and the current nesting depth.
//! It implements [`Decoder`] itself, so every primitive read is available
//! directly on it, and adds nested-message handling on top.

use std::any::Any;

use bytes::Bytes;

use crate::context::Params;
use crate::decoder::{BufDecoder, Decoder, Limits};
use crate::error::{Error, Result};
use crate::registry::Registry;

enum Source<'a> {
    Owned(Box<dyn Decoder + 'a>),
    Borrowed(&'a mut dyn Decoder),
}

/// Reads tags and values for one message level.
pub struct TagReader<'a> {
    source: Source<'a>,
    registry: &'a Registry,
    params: Params<'a>,
    depth: usize,
}

impl<'a> TagReader<'a> {
    /// A top level reader over `decoder`.
    pub fn new(decoder: &'a mut dyn Decoder, registry: &'a Registry) -> Self {
        Self::root(Source::Borrowed(decoder), registry, Params::new())
    }

    /// A top level reader whose parameter lookups fall back to `params`.
    pub fn with_params(
        decoder: &'a mut dyn Decoder,
        registry: &'a Registry,
        params: &'a Params<'a>,
    ) -> Self {
        Self::root(Source::Borrowed(decoder), registry, Params::scoped(params))
    }

    /// A top level reader that owns its decoder.
    pub fn from_decoder(decoder: impl Decoder + 'a, registry: &'a Registry) -> Self {
        Self::root(Source::Owned(Box::new(decoder)), registry, Params::new())
    }

    fn root(mut source: Source<'a>, registry: &'a Registry, params: Params<'a>) -> Self {
        let depth_limit = registry.config().get_max_nesting_depth();
        match &mut source {
            Source::Owned(decoder) => decoder.set_recursion_limit(depth_limit),
            Source::Borrowed(decoder) => decoder.set_recursion_limit(depth_limit),
        }
        TagReader {
            source,
            registry,
            params,
            depth: 0,
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// How many messages or groups enclose this reader.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn params(&self) -> &Params<'a> {
        &self.params
    }

    pub fn param<T: Any>(&self, key: &str) -> Option<&T> {
        self.params.get(key)
    }

    /// Set a parameter visible to this reader and every reader nested in it.
    pub fn set_param<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.params.set(key, value);
    }

    fn decoder(&self) -> &dyn Decoder {
        match &self.source {
            Source::Owned(decoder) => &**decoder,
            Source::Borrowed(decoder) => &**decoder,
        }
    }

    fn decoder_mut(&mut self) -> &mut dyn Decoder {
        match &mut self.source {
            Source::Owned(decoder) => &mut **decoder,
            Source::Borrowed(decoder) => &mut **decoder,
        }
    }

    fn child_depth(&self) -> Result<usize> {
        let limit = self.registry.config().get_max_nesting_depth();
        if self.depth >= limit {
            return Err(Error::NestingTooDeep { limit });
        }
        Ok(self.depth + 1)
    }

    /// A child reader sharing this reader's decoder, one level deeper.
    ///
    /// Used for groups, and for messages once their limit has been pushed.
    pub fn nested(&mut self) -> Result<TagReader<'_>> {
        let depth = self.child_depth()?;
        tracing::trace!(depth, "entering nested frame");
        let decoder: &mut dyn Decoder = match &mut self.source {
            Source::Owned(decoder) => &mut **decoder,
            Source::Borrowed(decoder) => &mut **decoder,
        };
        Ok(TagReader {
            source: Source::Borrowed(decoder),
            registry: self.registry,
            params: Params::scoped(&self.params),
            depth,
        })
    }

    /// Read a length-delimited field's payload and return an independent
    /// reader over just those bytes.
    pub fn sub_reader_from_array(&mut self) -> Result<TagReader<'_>> {
        let payload = self.read_byte_buffer()?;
        self.sub_reader_over(payload)
    }

    pub(crate) fn sub_reader_over(&mut self, payload: Bytes) -> Result<TagReader<'_>> {
        let depth = self.child_depth()?;
        tracing::trace!(depth, len = payload.len(), "entering nested frame from captured bytes");
        let mut decoder = BufDecoder::new(payload);
        decoder.set_recursion_limit(self.registry.config().get_max_nesting_depth());
        Ok(TagReader {
            source: Source::Owned(Box::new(decoder)),
            registry: self.registry,
            params: Params::scoped(&self.params),
            depth,
        })
    }

    /// Read a length-delimited embedded message in place.
    ///
    /// The limit is narrowed to the message's frame while `f` runs, and `f`
    /// must consume the frame entirely.
    pub fn read_nested<T>(&mut self, f: impl FnOnce(TagReader<'_>) -> Result<T>) -> Result<T> {
        let len = self.read_length()?;
        let old_limit = self.push_limit(len)?;
        let value = f(self.nested()?)?;
        self.check_last_tag_was(0)?;
        self.pop_limit(old_limit);
        Ok(value)
    }

    /// Read the rest of the input as a message of type `T`.
    pub fn read_message<T: 'static>(self) -> Result<T> {
        let delegate = self.registry.get_marshaller_delegate::<T>()?;
        delegate.read(self)
    }
}

impl Decoder for TagReader<'_> {
    #[inline]
    fn position(&self) -> u64 {
        self.decoder().position()
    }

    fn is_at_end(&mut self) -> Result<bool> {
        self.decoder_mut().is_at_end()
    }

    fn read_raw_byte(&mut self) -> Result<u8> {
        self.decoder_mut().read_raw_byte()
    }

    fn read_raw_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.decoder_mut().read_raw_into(dst)
    }

    fn read_raw_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.decoder_mut().read_raw_bytes(len)
    }

    fn skip_raw_bytes(&mut self, len: usize) -> Result<()> {
        self.decoder_mut().skip_raw_bytes(len)
    }

    fn limits(&self) -> &Limits {
        self.decoder().limits()
    }

    fn limits_mut(&mut self) -> &mut Limits {
        self.decoder_mut().limits_mut()
    }

    #[inline]
    fn read_varint64(&mut self) -> Result<u64> {
        self.decoder_mut().read_varint64()
    }
}

impl core::fmt::Debug for TagReader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TagReader")
            .field("position", &self.position())
            .field("limits", self.limits())
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ArrayDecoder;
    use crate::encoder::{BufEncoder, Encoder};
    use crate::wire::WireType;
    use crate::Config;

    /// `{1: 7, 2: {1: "inner"}, 3: 9}`
    fn sample() -> Vec<u8> {
        let mut inner = Vec::new();
        BufEncoder::new(&mut inner).write_string_field(1, "inner").unwrap();

        let mut out = Vec::new();
        let mut enc = BufEncoder::new(&mut out);
        enc.write_uint32_field(1, 7).unwrap();
        enc.write_bytes_field(2, &inner).unwrap();
        enc.write_uint32_field(3, 9).unwrap();
        out
    }

    #[test]
    fn test_read_nested_in_place() {
        let registry = Registry::default();
        let data = sample();
        let mut decoder = ArrayDecoder::new(&data);
        let mut reader = TagReader::new(&mut decoder, &registry);

        assert_eq!(reader.read_tag().unwrap(), 0x08);
        assert_eq!(reader.read_uint32().unwrap(), 7);
        assert_eq!(reader.read_tag().unwrap(), 0x12);
        let inner = reader
            .read_nested(|mut child| {
                assert_eq!(child.depth(), 1);
                assert_eq!(child.read_tag()?, 0x0A);
                let value = child.read_string()?;
                assert_eq!(child.read_tag()?, 0);
                Ok(value)
            })
            .unwrap();
        assert_eq!(inner, "inner");
        assert_eq!(reader.read_tag().unwrap(), 0x18);
        assert_eq!(reader.read_uint32().unwrap(), 9);
        assert_eq!(reader.read_tag().unwrap(), 0);
    }

    #[test]
    fn test_read_nested_must_consume_frame() {
        let registry = Registry::default();
        let data = sample();
        let mut reader = TagReader::from_decoder(ArrayDecoder::new(&data), &registry);
        reader.read_tag().unwrap();
        reader.read_uint32().unwrap();
        reader.read_tag().unwrap();
        let result = reader.read_nested(|_child| Ok(()));
        assert!(matches!(result, Err(Error::TagMismatch { .. })));
    }

    #[test]
    fn test_sub_reader_from_array() {
        let registry = Registry::default();
        let data = sample();
        let mut reader = TagReader::from_decoder(ArrayDecoder::new(&data), &registry);
        reader.read_tag().unwrap();
        reader.read_uint32().unwrap();
        reader.read_tag().unwrap();
        {
            let mut child = reader.sub_reader_from_array().unwrap();
            assert_eq!(child.position(), 0);
            assert_eq!(child.read_tag().unwrap(), 0x0A);
            assert_eq!(child.read_string().unwrap(), "inner");
            assert_eq!(child.read_tag().unwrap(), 0);
        }
        // The parent already moved past the whole frame.
        assert_eq!(reader.read_tag().unwrap(), 0x18);
    }

    #[test]
    fn test_params_flow_to_children() {
        let registry = Registry::default();
        let mut root = Params::new();
        root.set("trace", true);
        let data = sample();
        let mut decoder = ArrayDecoder::new(&data);
        let mut reader = TagReader::with_params(&mut decoder, &registry, &root);
        reader.set_param("level", 0u8);

        let mut child = reader.nested().unwrap();
        child.set_param("level", 1u8);
        assert_eq!(child.param::<bool>("trace"), Some(&true));
        assert_eq!(child.param::<u8>("level"), Some(&1));
        drop(child);
        assert_eq!(reader.param::<u8>("level"), Some(&0));
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let mut config = Config::new();
        config.max_nesting_depth(2);
        let registry = Registry::new(config);
        let mut reader = TagReader::from_decoder(ArrayDecoder::new(&[]), &registry);
        let mut first = reader.nested().unwrap();
        let mut second = first.nested().unwrap();
        assert!(matches!(second.nested(), Err(Error::NestingTooDeep { limit: 2 })));
    }

    #[test]
    fn test_group_skip_uses_configured_depth() {
        let mut config = Config::new();
        config.max_nesting_depth(3);
        let registry = Registry::new(config);
        let data = [0x0B, 0x0B, 0x0B, 0x0B, 0x0C, 0x0C, 0x0C, 0x0C];
        let mut reader = TagReader::from_decoder(ArrayDecoder::new(&data), &registry);
        let tag = reader.read_tag().unwrap();
        assert_eq!(crate::wire::tag_wire_type(tag).unwrap(), WireType::StartGroup);
        assert!(matches!(reader.skip_field(tag), Err(Error::NestingTooDeep { limit: 3 })));
    }
}
