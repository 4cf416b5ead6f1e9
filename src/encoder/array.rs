use super::Encoder;
use crate::error::{Error, Result};
use crate::util::CastFrom;

/// An [`Encoder`] over a fixed size `&mut [u8]`.
///
/// Writes that do not fit fail with [`Error::OutOfSpace`] and leave the
/// output untouched.
#[derive(Debug)]
pub struct ArrayEncoder<'a> {
    data: &'a mut [u8],
    pos: usize,
}

impl<'a> ArrayEncoder<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        ArrayEncoder { data, pos: 0 }
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.data[..self.pos]
    }

    #[cold]
    fn out_of_space(&self, needed: usize) -> Error {
        Error::OutOfSpace {
            needed,
            remaining: self.remaining(),
        }
    }
}

impl Encoder for ArrayEncoder<'_> {
    #[inline]
    fn position(&self) -> u64 {
        u64::cast_from(self.pos)
    }

    fn write_raw_byte(&mut self, byte: u8) -> Result<()> {
        if self.pos >= self.data.len() {
            return Err(self.out_of_space(1));
        }
        self.data[self.pos] = byte;
        self.pos += 1;
        Ok(())
    }

    fn write_raw_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(self.out_of_space(bytes.len()));
        }
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    fn ensure_room(&mut self, len: usize) -> Result<()> {
        // `len` is an upper bound, only fail if even the smallest write can't fit.
        if self.remaining() == 0 && len > 0 {
            return Err(self.out_of_space(len));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
