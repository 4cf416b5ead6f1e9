use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use super::{read_varint_bytewise, Decoder, Limits};
use crate::error::{Error, Result};
use crate::leb128::decode_varint;
use crate::util::CastFrom;

/// Default size of the internal read-ahead buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
/// Smallest internal buffer we allow, large enough to hold any tag plus varint.
pub const MIN_BUFFER_SIZE: usize = 32;

/// A [`Decoder`] over a [`std::io::Read`].
///
/// Bytes are read ahead into a fixed size buffer. Consumed bytes are slid out
/// of the front of the buffer on refill, and `retired` counts how many bytes
/// were consumed before the current buffer start so that positions stay
/// absolute for limit math.
///
/// Reads longer than the buffer are satisfied in buffer sized chunks, so an
/// attacker supplied length prefix only ever costs as much memory as the
/// bytes that actually arrive.
pub struct StreamDecoder<R> {
    reader: R,
    buf: Box<[u8]>,
    /// Read cursor into `buf`.
    pos: usize,
    /// Number of valid bytes in `buf`.
    filled: usize,
    /// Bytes consumed before `buf[0]`.
    retired: u64,
    eof: bool,
    limits: Limits,
}

impl<R: Read> StreamDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        StreamDecoder {
            reader,
            buf: vec![0u8; capacity.max(MIN_BUFFER_SIZE)].into_boxed_slice(),
            pos: 0,
            filled: 0,
            retired: 0,
            eof: false,
            limits: Limits::new(None),
        }
    }

    /// Returns the underlying reader. Bytes that were read ahead are lost.
    pub fn into_inner(self) -> R {
        self.reader
    }

    #[inline]
    fn buffered(&self) -> &[u8] {
        &self.buf[self.pos..self.filled]
    }

    /// Read once from the underlying reader into `dst`, retrying on interrupts.
    fn read_some(reader: &mut R, dst: &mut [u8]) -> Result<usize> {
        loop {
            match reader.read(dst) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Slide unread bytes to the front and read more.
    ///
    /// Returns `false` if no new bytes could be buffered.
    fn refill(&mut self) -> Result<bool> {
        if self.pos > 0 {
            self.buf.copy_within(self.pos..self.filled, 0);
            self.retired += u64::cast_from(self.pos);
            self.filled -= self.pos;
            self.pos = 0;
        }
        if self.eof || self.filled == self.buf.len() {
            return Ok(false);
        }

        let n = Self::read_some(&mut self.reader, &mut self.buf[self.filled..])?;
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.filled += n;
        Ok(true)
    }

    /// Make sure at least `len` bytes are buffered, `len` must fit in the buffer.
    fn ensure_buffered(&mut self, len: usize) -> Result<()> {
        debug_assert!(len <= self.buf.len());
        self.limits.check(self.position(), len)?;
        while self.filled - self.pos < len {
            if !self.refill()? {
                return Err(self.limits.exhausted(self.position(), len));
            }
        }
        Ok(())
    }

    /// Consume `len` bytes, handing each contiguous piece to `sink`.
    ///
    /// Serves what is buffered first, then reads directly from the source in
    /// buffer sized chunks.
    fn consume_chunked(&mut self, len: usize, mut sink: impl FnMut(&[u8])) -> Result<()> {
        self.limits.check(self.position(), len)?;

        let from_buffer = len.min(self.filled - self.pos);
        sink(&self.buf[self.pos..self.pos + from_buffer]);
        self.pos += from_buffer;

        let mut remaining = len - from_buffer;
        if remaining == 0 {
            return Ok(());
        }

        // The buffer is drained, retire it and stream the rest through it.
        self.retired += u64::cast_from(self.filled);
        self.pos = 0;
        self.filled = 0;
        while remaining > 0 {
            let want = remaining.min(self.buf.len());
            let n = Self::read_some(&mut self.reader, &mut self.buf[..want])?;
            if n == 0 {
                self.eof = true;
                return Err(self.limits.exhausted(self.position(), remaining));
            }
            sink(&self.buf[..n]);
            self.retired += u64::cast_from(n);
            remaining -= n;
        }
        Ok(())
    }
}

impl<R: Read> Decoder for StreamDecoder<R> {
    #[inline]
    fn position(&self) -> u64 {
        self.retired + u64::cast_from(self.pos)
    }

    fn is_at_end(&mut self) -> Result<bool> {
        if self.limits.limit().is_some_and(|limit| self.position() >= limit) {
            return Ok(true);
        }
        if self.pos < self.filled {
            return Ok(false);
        }
        if self.refill()? {
            return Ok(false);
        }
        // The source ended inside a frame that promised more bytes.
        if self.limits.limit().is_some() {
            return Err(Error::truncated());
        }
        Ok(true)
    }

    fn read_raw_byte(&mut self) -> Result<u8> {
        self.ensure_buffered(1)?;
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn read_raw_into(&mut self, dst: &mut [u8]) -> Result<()> {
        if dst.len() <= self.buf.len() {
            self.ensure_buffered(dst.len())?;
            dst.copy_from_slice(&self.buf[self.pos..self.pos + dst.len()]);
            self.pos += dst.len();
            return Ok(());
        }
        let mut offset = 0;
        self.consume_chunked(dst.len(), |piece| {
            dst[offset..offset + piece.len()].copy_from_slice(piece);
            offset += piece.len();
        })
    }

    fn read_raw_bytes(&mut self, len: usize) -> Result<Bytes> {
        if len <= self.buf.len() {
            self.ensure_buffered(len)?;
            let out = Bytes::copy_from_slice(&self.buf[self.pos..self.pos + len]);
            self.pos += len;
            return Ok(out);
        }
        // Grow with the data that actually arrives, not with the declared length.
        let mut out = BytesMut::with_capacity(self.buf.len());
        self.consume_chunked(len, |piece| out.extend_from_slice(piece))?;
        Ok(out.freeze())
    }

    fn skip_raw_bytes(&mut self, len: usize) -> Result<()> {
        self.consume_chunked(len, |_| ())
    }

    fn limits(&self) -> &Limits {
        &self.limits
    }

    fn limits_mut(&mut self) -> &mut Limits {
        &mut self.limits
    }

    fn read_varint64(&mut self) -> Result<u64> {
        let readable = usize::try_from(self.limits.readable_from(self.position()))
            .unwrap_or(usize::MAX);
        let buffered = self.buffered();
        let window_len = buffered.len().min(readable);

        match decode_varint(&buffered[..window_len])? {
            Some((value, len)) => {
                self.pos += len;
                Ok(value)
            }
            // Not enough buffered, refill a byte at a time.
            None => read_varint_bytewise(self),
        }
    }
}

impl<R> core::fmt::Debug for StreamDecoder<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamDecoder")
            .field("capacity", &self.buf.len())
            .field("buffered", &(self.filled - self.pos))
            .field("retired", &self.retired)
            .field("eof", &self.eof)
            .field("limits", &self.limits)
            .finish()
    }
}
