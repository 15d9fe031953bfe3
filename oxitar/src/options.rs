//! Reader and writer configuration.
//!
//! Archives are block-aligned on a record size that is a multiple of the
//! 512-byte header block. The record size only sizes the internal buffer;
//! the byte layout of the archive does not depend on it.

use oxitar_core::{BLOCK_SIZE, Result, TarError};

/// Default record size (20 blocks).
pub const DEFAULT_BLOCK_SIZE: usize = 10240;

/// Largest accepted record size (63 blocks).
pub const MAX_BLOCK_SIZE: usize = 32256;

fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(TarError::invalid_argument(format!(
            "block size {block_size} outside 512..={MAX_BLOCK_SIZE}"
        )));
    }
    if block_size % BLOCK_SIZE != 0 {
        return Err(TarError::invalid_argument(format!(
            "block size {block_size} is not a multiple of {BLOCK_SIZE}"
        )));
    }
    Ok(())
}

/// Options for [`TarReader`](crate::TarReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Record size used for buffering.
    pub block_size: usize,
    /// Skip zero blocks instead of treating them as end of archive.
    pub ignore_zeros: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            ignore_zeros: false,
        }
    }
}

impl ReadOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the record size.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Skip zero blocks, for reading concatenated archives.
    pub fn ignore_zeros(mut self, ignore: bool) -> Self {
        self.ignore_zeros = ignore;
        self
    }

    /// Check the options.
    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)
    }
}

/// Options for [`TarWriter`](crate::TarWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Record size used for buffering.
    pub block_size: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl WriteOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the record size.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Check the options.
    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)
    }
}
