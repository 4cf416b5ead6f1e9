//! Settings that shape every reader and writer a [`crate::Registry`] creates.

use crate::decoder::{self, DEFAULT_RECURSION_LIMIT};

/// Default global read budget for stream decoders.
pub const DEFAULT_STREAM_GLOBAL_LIMIT: u64 = 64 << 20;

/// Configuration for a [`crate::Registry`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Total byte budget for decoders over in-memory input.
    pub(crate) global_limit: Option<u64>,

    /// Total byte budget for decoders over a [`std::io::Read`].
    pub(crate) stream_global_limit: Option<u64>,

    /// Size of the internal buffer for stream decoders and encoders.
    pub(crate) stream_buffer_size: usize,

    /// How deeply messages and groups may nest.
    pub(crate) max_nesting_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global_limit: None,
            stream_global_limit: Some(DEFAULT_STREAM_GLOBAL_LIMIT),
            stream_buffer_size: decoder::DEFAULT_BUFFER_SIZE,
            max_nesting_depth: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl Config {
    /// Create a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the total number of bytes a single decode may read, `None` for no bound.
    ///
    /// Applies to every kind of input, replacing the 64 MiB default for streams.
    pub fn global_limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.global_limit = limit;
        self.stream_global_limit = limit;
        self
    }

    /// Set the internal buffer size for stream decoders and encoders.
    ///
    /// Values below [`decoder::MIN_BUFFER_SIZE`] are raised to it.
    pub fn stream_buffer_size(&mut self, size: usize) -> &mut Self {
        self.stream_buffer_size = size.max(decoder::MIN_BUFFER_SIZE);
        self
    }

    /// Bound how deeply messages and groups may nest.
    pub fn max_nesting_depth(&mut self, depth: usize) -> &mut Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn get_global_limit(&self) -> Option<u64> {
        self.global_limit
    }

    pub fn get_stream_global_limit(&self) -> Option<u64> {
        self.stream_global_limit
    }

    pub fn get_stream_buffer_size(&self) -> usize {
        self.stream_buffer_size
    }

    pub fn get_max_nesting_depth(&self) -> usize {
        self.max_nesting_depth
    }
}
