use bytes::Bytes;

use super::{Decoder, Limits};
use crate::error::{Error, Result};
use crate::leb128::decode_varint;
use crate::util::CastFrom;

/// A [`Decoder`] over a flat byte slice.
#[derive(Debug, Clone)]
pub struct ArrayDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    limits: Limits,
}

impl<'a> ArrayDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ArrayDecoder {
            data,
            pos: 0,
            limits: Limits::new(Some(u64::cast_from(data.len()))),
        }
    }

    /// The bytes readable before hitting either limit.
    #[inline]
    fn window(&self) -> &'a [u8] {
        let readable = self.limits.readable_from(u64::cast_from(self.pos));
        let end = usize::try_from(readable)
            .map(|readable| self.pos.saturating_add(readable))
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let data: &'a [u8] = self.data;
        &data[self.pos..end]
    }

    #[inline]
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let window = self.window();
        if window.len() < len {
            return Err(self.limits.exhausted(u64::cast_from(self.pos), len));
        }
        self.pos += len;
        Ok(&window[..len])
    }
}

impl Decoder for ArrayDecoder<'_> {
    #[inline]
    fn position(&self) -> u64 {
        u64::cast_from(self.pos)
    }

    fn is_at_end(&mut self) -> Result<bool> {
        let at_limit = self.limits.limit().is_some_and(|limit| self.position() >= limit);
        Ok(at_limit || self.pos >= self.data.len())
    }

    #[inline]
    fn read_raw_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_raw_into(&mut self, dst: &mut [u8]) -> Result<()> {
        dst.copy_from_slice(self.take(dst.len())?);
        Ok(())
    }

    fn read_raw_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.take(len).map(Bytes::copy_from_slice)
    }

    fn skip_raw_bytes(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    fn limits(&self) -> &Limits {
        &self.limits
    }

    fn limits_mut(&mut self) -> &mut Limits {
        &mut self.limits
    }

    #[inline]
    fn read_varint64(&mut self) -> Result<u64> {
        let window = self.window();
        match decode_varint(window)? {
            Some((value, len)) => {
                self.pos += len;
                Ok(value)
            }
            None => Err(self.exhausted_varint(window.len())),
        }
    }
}

impl ArrayDecoder<'_> {
    #[cold]
    fn exhausted_varint(&self, available: usize) -> Error {
        self.limits
            .exhausted(u64::cast_from(self.pos), available.saturating_add(1))
    }
}
