use std::io::Write;

use super::{Encoder, MAX_ATOMIC_WRITE};
use crate::error::Result;
use crate::util::CastFrom;

/// Default size of the internal write buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// An [`Encoder`] in front of a [`std::io::Write`].
///
/// Bytes are collected in a fixed size buffer which is handed to the sink
/// only when the next atomic write would not fit, or on [`Encoder::flush`].
/// Payloads larger than the buffer bypass it. Buffered bytes are not written
/// on drop, call [`Encoder::flush`] or [`StreamEncoder::into_inner`].
pub struct StreamEncoder<W: Write> {
    writer: W,
    buf: Vec<u8>,
    capacity: usize,
    /// Bytes already handed to `writer`.
    flushed: u64,
}

impl<W: Write> StreamEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        let capacity = capacity.max(MAX_ATOMIC_WRITE);
        StreamEncoder {
            writer,
            buf: Vec::with_capacity(capacity),
            capacity,
            flushed: 0,
        }
    }

    /// Number of bytes waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Flush everything and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.writer)
    }

    fn drain_buffer(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.writer.write_all(&self.buf)?;
            self.flushed += u64::cast_from(self.buf.len());
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: Write> Encoder for StreamEncoder<W> {
    #[inline]
    fn position(&self) -> u64 {
        self.flushed + u64::cast_from(self.buf.len())
    }

    fn write_raw_byte(&mut self, byte: u8) -> Result<()> {
        if self.buf.len() == self.capacity {
            self.drain_buffer()?;
        }
        self.buf.push(byte);
        Ok(())
    }

    fn write_raw_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() <= self.capacity - self.buf.len() {
            self.buf.extend_from_slice(bytes);
            return Ok(());
        }
        self.drain_buffer()?;
        if bytes.len() < self.capacity {
            self.buf.extend_from_slice(bytes);
        } else {
            self.writer.write_all(bytes)?;
            self.flushed += u64::cast_from(bytes.len());
        }
        Ok(())
    }

    fn ensure_room(&mut self, len: usize) -> Result<()> {
        if len > self.capacity - self.buf.len() {
            self.drain_buffer()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.drain_buffer()?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> core::fmt::Debug for StreamEncoder<W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamEncoder")
            .field("capacity", &self.capacity)
            .field("buffered", &self.buf.len())
            .field("flushed", &self.flushed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink recording the size of every write it receives.
    #[derive(Default)]
    struct Recording {
        data: Vec<u8>,
        writes: Vec<usize>,
        flushes: usize,
    }

    impl Write for Recording {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            self.writes.push(buf.len());
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_tag_and_value_never_split() {
        let mut sink = Recording::default();
        let mut enc = StreamEncoder::with_capacity(&mut sink, 32);
        for _ in 0..20 {
            enc.write_uint64_field(1, u64::MAX).unwrap();
        }
        enc.flush().unwrap();
        drop(enc);

        // Every field is 11 bytes, so each flushed chunk holds whole fields.
        for len in &sink.writes {
            assert_eq!(len % 11, 0);
        }
        assert_eq!(sink.data.len(), 20 * 11);
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn test_large_payload_bypasses_buffer() {
        let payload = vec![7u8; 100];
        let mut sink = Recording::default();
        let mut enc = StreamEncoder::with_capacity(&mut sink, 32);
        enc.write_bytes_field(1, &payload).unwrap();
        assert_eq!(enc.buffered(), 0);
        assert_eq!(enc.position(), 102);
        enc.flush().unwrap();
        drop(enc);
        assert_eq!(sink.writes, [2, 100]);
    }

    #[test]
    fn test_nothing_reaches_sink_before_flush() {
        let mut sink = Recording::default();
        let mut enc = StreamEncoder::new(&mut sink);
        enc.write_bool_field(1, true).unwrap();
        assert_eq!(enc.buffered(), 2);
        drop(enc);
        assert!(sink.data.is_empty());
    }

    #[test]
    fn test_into_inner_flushes() {
        let mut enc = StreamEncoder::new(Vec::new());
        enc.write_string_field(2, "hi").unwrap();
        assert_eq!(enc.into_inner().unwrap(), [0x12, 0x02, b'h', b'i']);
    }
}
