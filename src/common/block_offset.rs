//! Block offset type.

use std::fmt;

/// Byte offset of a block inside the index file.
///
/// A node's offset doubles as its identity: the `self`, `parent`, `prev`,
/// `next` and child fields of every node hold offsets of other blocks.
/// On disk an absent link is stored as [`BlockOffset::INVALID`]; in memory
/// absent links are modelled as `Option<BlockOffset>` and the sentinel
/// never escapes the node codec.
///
/// # Example
/// ```
/// use bplus_index::BlockOffset;
///
/// let offset = BlockOffset::new(4096);
/// assert!(offset.is_valid());
/// assert_eq!(BlockOffset::from_raw(u64::MAX), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockOffset(pub u64);

impl BlockOffset {
    /// Reserved sentinel, never used as a real block address.
    pub const INVALID: BlockOffset = BlockOffset(u64::MAX);

    /// Create a new BlockOffset.
    #[inline]
    pub fn new(offset: u64) -> Self {
        BlockOffset(offset)
    }

    /// Decode a raw on-disk value, mapping the sentinel to `None`.
    #[inline]
    pub fn from_raw(raw: u64) -> Option<Self> {
        let offset = BlockOffset(raw);
        offset.is_valid().then_some(offset)
    }

    /// Encode an optional link into its raw on-disk value.
    #[inline]
    pub fn to_raw(offset: Option<Self>) -> u64 {
        offset.unwrap_or(Self::INVALID).0
    }

    /// Check if this offset is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Whether this offset sits on a block boundary.
    #[inline]
    pub fn is_aligned(&self, block_size: usize) -> bool {
        self.0 % block_size as u64 == 0
    }
}

impl fmt::Display for BlockOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Block(INVALID)")
        } else {
            write!(f, "Block({:#x})", self.0)
        }
    }
}
