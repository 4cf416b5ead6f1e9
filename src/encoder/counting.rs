use super::Encoder;
use crate::error::Result;
use crate::util::CastFrom;

/// An [`Encoder`] that only counts the bytes it is given.
///
/// Running a message's writer against this yields its exact encoded size.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingEncoder {
    count: u64,
}

impl CountingEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder for CountingEncoder {
    #[inline]
    fn position(&self) -> u64 {
        self.count
    }

    #[inline]
    fn write_raw_byte(&mut self, _byte: u8) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    #[inline]
    fn write_raw_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.count += u64::cast_from(bytes.len());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
