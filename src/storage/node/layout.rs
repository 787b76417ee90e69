//! Capacity and payload offsets derived from the block size.

use crate::common::config::{KEY_SIZE, OFFSET_SIZE, VALUE_SIZE};
use crate::common::{Error, Result};

use super::header::NodeHeader;

/// Geometry of a node block, computed once per open tree.
///
/// # Payload layout
/// ```text
/// Leaf:      [header 48][keys: max_entries × 4][values: max_entries × 8]
/// Internal:  [header 48][keys: (max_order-1) × 4][children: max_order × 8]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    block_size: usize,
    max_order: usize,
    max_entries: usize,
}

impl NodeLayout {
    /// Derive the layout for `block_size`.
    ///
    /// # Errors
    /// `InvalidBlockSize` if the size is not a power of two, does not fit
    /// the header, or yields `max_order <= 2`.
    pub fn new(block_size: usize) -> Result<Self> {
        if !block_size.is_power_of_two() {
            return Err(Error::InvalidBlockSize {
                size: block_size,
                reason: "not a power of two",
            });
        }
        if block_size <= NodeHeader::SIZE {
            return Err(Error::InvalidBlockSize {
                size: block_size,
                reason: "smaller than the node header",
            });
        }

        let payload = block_size - NodeHeader::SIZE;
        let max_order = payload / (KEY_SIZE + OFFSET_SIZE);
        let max_entries = payload / (KEY_SIZE + VALUE_SIZE);

        if max_order <= 2 {
            return Err(Error::InvalidBlockSize {
                size: block_size,
                reason: "too small to hold a minimal node",
            });
        }

        Ok(Self {
            block_size,
            max_order,
            max_entries,
        })
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Maximum number of children in an internal node.
    #[inline]
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Maximum number of entries in a leaf.
    #[inline]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Fewest entries a non-root leaf may hold.
    #[inline]
    pub fn min_entries(&self) -> usize {
        (self.max_entries + 1) / 2
    }

    /// Fewest children a non-root internal node may hold.
    #[inline]
    pub fn min_order(&self) -> usize {
        (self.max_order + 1) / 2
    }

    /// Byte offset of key slot `index`.
    #[inline]
    pub fn key_offset(&self, index: usize) -> usize {
        NodeHeader::SIZE + index * KEY_SIZE
    }

    /// Byte offset of leaf value slot `index`.
    #[inline]
    pub fn value_offset(&self, index: usize) -> usize {
        NodeHeader::SIZE + self.max_entries * KEY_SIZE + index * VALUE_SIZE
    }

    /// Byte offset of internal child slot `index`.
    #[inline]
    pub fn child_offset(&self, index: usize) -> usize {
        NodeHeader::SIZE + (self.max_order - 1) * KEY_SIZE + index * OFFSET_SIZE
    }
}
