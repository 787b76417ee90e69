//! Configuration constants and open-time options.

use crate::common::{Error, Result};

/// Default block size in bytes (4KB).
///
/// Matches the OS page size on most systems. With a 48-byte node header
/// this gives 337 keys per leaf and 337 children per internal node.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Minimum number of node buffers.
///
/// A merge cascade simultaneously holds the node itself, its parent, both
/// siblings, and the sibling's far neighbour.
pub const MIN_CACHE_FRAMES: usize = 5;

/// Width in characters of every hexadecimal field in the boot record.
pub const BOOT_FIELD_WIDTH: usize = 16;

/// Suffix appended to the index path to locate the boot record.
pub const BOOT_SUFFIX: &str = ".boot";

/// Longest index path accepted by `open`.
pub const MAX_PATH_LEN: usize = 1024;

/// Value reserved by `put` to mean "delete this key".
pub const EMPTY_VALUE: i64 = 0;

/// On-disk width of a key.
pub const KEY_SIZE: usize = std::mem::size_of::<i32>();

/// On-disk width of a leaf value.
pub const VALUE_SIZE: usize = std::mem::size_of::<i64>();

/// On-disk width of a block offset.
pub const OFFSET_SIZE: usize = std::mem::size_of::<u64>();

/// Options for opening a tree.
///
/// # Example
/// ```
/// use bplus_index::TreeConfig;
///
/// let config = TreeConfig::new()
///     .with_block_size(512)
///     .with_cache_frames(8)
///     .with_sync_writes(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Block size used when no boot record exists yet.
    pub block_size: usize,

    /// Number of node buffers in the cache.
    pub cache_frames: usize,

    /// Whether every block write is followed by `fsync()`.
    pub sync_writes: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_frames: MIN_CACHE_FRAMES,
            sync_writes: false,
        }
    }
}

impl TreeConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the number of node buffers.
    pub fn with_cache_frames(mut self, frames: usize) -> Self {
        self.cache_frames = frames;
        self
    }

    /// Enables or disables fsync after every block write.
    pub fn with_sync_writes(mut self, enable: bool) -> Self {
        self.sync_writes = enable;
        self
    }

    /// Checks the cache size and the block size.
    pub fn validate(&self) -> Result<()> {
        if self.cache_frames < MIN_CACHE_FRAMES {
            return Err(Error::InvalidCacheSize(self.cache_frames));
        }
        crate::storage::node::NodeLayout::new(self.block_size).map(|_| ())
    }
}
