use bytes::BufMut;

use super::Encoder;
use crate::error::{Error, Result};
use crate::util::CastFrom;

/// An [`Encoder`] over any [`bytes::BufMut`].
///
/// Growable buffers like `Vec<u8>` and `BytesMut` never run out of space,
/// fixed ones report [`Error::OutOfSpace`] before writing.
#[derive(Debug)]
pub struct BufEncoder<B> {
    buf: B,
    written: u64,
}

impl<B: BufMut> BufEncoder<B> {
    pub fn new(buf: B) -> Self {
        BufEncoder { buf, written: 0 }
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    pub fn get_ref(&self) -> &B {
        &self.buf
    }
}

impl<B: BufMut> Encoder for BufEncoder<B> {
    #[inline]
    fn position(&self) -> u64 {
        self.written
    }

    #[inline]
    fn write_raw_byte(&mut self, byte: u8) -> Result<()> {
        self.ensure_room(1)?;
        self.buf.put_u8(byte);
        self.written += 1;
        Ok(())
    }

    #[inline]
    fn write_raw_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.buf.remaining_mut() < bytes.len() {
            return Err(Error::OutOfSpace {
                needed: bytes.len(),
                remaining: self.buf.remaining_mut(),
            });
        }
        self.buf.put_slice(bytes);
        self.written += u64::cast_from(bytes.len());
        Ok(())
    }

    fn ensure_room(&mut self, len: usize) -> Result<()> {
        let remaining = self.buf.remaining_mut();
        if remaining == 0 && len > 0 {
            return Err(Error::OutOfSpace {
                needed: len,
                remaining,
            });
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
