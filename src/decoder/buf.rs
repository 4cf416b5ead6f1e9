use bytes::{Buf, Bytes};

use super::{read_varint_bytewise, Decoder, Limits};
use crate::error::Result;
use crate::leb128::decode_varint;
use crate::util::CastFrom;

/// A [`Decoder`] over any [`bytes::Buf`].
///
/// When `B` is [`Bytes`], length-delimited reads are zero-copy slices of the
/// original allocation. Non-contiguous buffers (e.g. a [`bytes::buf::Chain`])
/// are supported, varints spanning chunks fall back to a byte-at-a-time read.
#[derive(Debug)]
pub struct BufDecoder<B> {
    buf: B,
    consumed: u64,
    limits: Limits,
}

impl<B: Buf> BufDecoder<B> {
    pub fn new(buf: B) -> Self {
        let len = u64::cast_from(buf.remaining());
        BufDecoder {
            buf,
            consumed: 0,
            limits: Limits::new(Some(len)),
        }
    }

    /// Returns the remaining, unread part of the buffer.
    pub fn into_inner(self) -> B {
        self.buf
    }

    #[inline]
    fn ensure(&self, len: usize) -> Result<()> {
        self.limits.check(self.consumed, len)?;
        if self.buf.remaining() < len {
            return Err(self.limits.exhausted(self.consumed, len));
        }
        Ok(())
    }

    #[inline]
    fn advance(&mut self, len: usize) {
        self.buf.advance(len);
        self.consumed += u64::cast_from(len);
    }
}

impl<B: Buf> Decoder for BufDecoder<B> {
    #[inline]
    fn position(&self) -> u64 {
        self.consumed
    }

    fn is_at_end(&mut self) -> Result<bool> {
        let at_limit = self.limits.limit().is_some_and(|limit| self.consumed >= limit);
        Ok(at_limit || !self.buf.has_remaining())
    }

    fn read_raw_byte(&mut self) -> Result<u8> {
        self.ensure(1)?;
        self.consumed += 1;
        Ok(self.buf.get_u8())
    }

    fn read_raw_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure(dst.len())?;
        self.buf.copy_to_slice(dst);
        self.consumed += u64::cast_from(dst.len());
        Ok(())
    }

    fn read_raw_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        self.consumed += u64::cast_from(len);
        Ok(self.buf.copy_to_bytes(len))
    }

    fn skip_raw_bytes(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.advance(len);
        Ok(())
    }

    fn limits(&self) -> &Limits {
        &self.limits
    }

    fn limits_mut(&mut self) -> &mut Limits {
        &mut self.limits
    }

    fn read_varint64(&mut self) -> Result<u64> {
        let readable = usize::try_from(self.limits.readable_from(self.consumed))
            .unwrap_or(usize::MAX)
            .min(self.buf.remaining());
        let chunk = self.buf.chunk();
        let window_len = chunk.len().min(readable);

        match decode_varint(&chunk[..window_len])? {
            Some((value, len)) => {
                self.advance(len);
                Ok(value)
            }
            // The varint continues into the next chunk.
            None if window_len < readable => read_varint_bytewise(self),
            None => Err(self
                .limits
                .exhausted(self.consumed, window_len.saturating_add(1))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_copy_bytes() {
        let data = Bytes::from_static(&[0x03, b'a', b'b', b'c']);
        let mut dec = BufDecoder::new(data.clone());
        let out = dec.read_byte_buffer().unwrap();
        assert_eq!(&out[..], b"abc");
        // Shares the original allocation.
        assert_eq!(out.as_ptr(), data[1..].as_ptr());
    }

    #[test]
    fn test_varint_across_chunks() {
        let first: &[u8] = &[0x08, 0xAC];
        let second: &[u8] = &[0x02, 0x10, 0x01];
        let mut dec = BufDecoder::new(first.chain(second));
        assert_eq!(dec.read_tag().unwrap(), 0x08);
        assert_eq!(dec.read_uint32().unwrap(), 300);
        assert_eq!(dec.read_tag().unwrap(), 0x10);
        assert!(dec.read_bool().unwrap());
        assert_eq!(dec.read_tag().unwrap(), 0);
        assert_eq!(dec.position(), 5);
    }
}
