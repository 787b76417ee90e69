//! Node header and kind definitions.
//!
//! Every block starts with a [`NodeHeader`] containing:
//! - the node's own offset and its parent/sibling links
//! - [`NodeKind`] discriminator and occupancy count
//! - CRC32 checksum for integrity

use crate::common::BlockOffset;

/// Kind of node stored in a block.
#[repr(u32)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Keys paired with values, linked into the leaf chain.
    #[default]
    Leaf = 0,
    /// Separator keys and child offsets.
    Internal = 1,
}

impl NodeKind {
    /// Convert from the raw on-disk tag, `None` for unknown values.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(NodeKind::Leaf),
            1 => Some(NodeKind::Internal),
            _ => None,
        }
    }
}

/// Metadata stored at the beginning of every block.
///
/// # Layout (48 bytes, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       8     self
/// 8       8     parent   (INVALID if root)
/// 16      8     prev     (INVALID if leftmost at its level)
/// 24      8     next     (INVALID if rightmost at its level)
/// 32      4     kind
/// 36      4     count    (entries for a leaf, children for an internal node)
/// 40      4     checksum (CRC32 with this field zeroed)
/// 44      4     reserved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub offset: Option<BlockOffset>,
    pub parent: Option<BlockOffset>,
    pub prev: Option<BlockOffset>,
    pub next: Option<BlockOffset>,
    /// Raw kind tag; decode with [`NodeKind::from_u32`].
    pub kind: u32,
    pub count: u32,
    pub checksum: u32,
}

impl NodeHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 48;

    pub const OFFSET_SELF: usize = 0;
    pub const OFFSET_PARENT: usize = 8;
    pub const OFFSET_PREV: usize = 16;
    pub const OFFSET_NEXT: usize = 24;
    pub const OFFSET_KIND: usize = 32;
    pub const OFFSET_COUNT: usize = 36;
    pub const OFFSET_CHECKSUM: usize = 40;

    /// Header of a fresh, unplaced node with no links.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            offset: None,
            parent: None,
            prev: None,
            next: None,
            kind: kind as u32,
            count: 0,
            checksum: 0,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < NodeHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for NodeHeader");

        Self {
            offset: BlockOffset::from_raw(read_u64(data, Self::OFFSET_SELF)),
            parent: BlockOffset::from_raw(read_u64(data, Self::OFFSET_PARENT)),
            prev: BlockOffset::from_raw(read_u64(data, Self::OFFSET_PREV)),
            next: BlockOffset::from_raw(read_u64(data, Self::OFFSET_NEXT)),
            kind: read_u32(data, Self::OFFSET_KIND),
            count: read_u32(data, Self::OFFSET_COUNT),
            checksum: read_u32(data, Self::OFFSET_CHECKSUM),
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < NodeHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for NodeHeader");

        write_u64(data, Self::OFFSET_SELF, BlockOffset::to_raw(self.offset));
        write_u64(data, Self::OFFSET_PARENT, BlockOffset::to_raw(self.parent));
        write_u64(data, Self::OFFSET_PREV, BlockOffset::to_raw(self.prev));
        write_u64(data, Self::OFFSET_NEXT, BlockOffset::to_raw(self.next));
        write_u32(data, Self::OFFSET_KIND, self.kind);
        write_u32(data, Self::OFFSET_COUNT, self.count);
        write_u32(data, Self::OFFSET_CHECKSUM, self.checksum);
        data[Self::OFFSET_CHECKSUM + 4..Self::SIZE].fill(0);
    }

    /// Compute the CRC32 of a block with the checksum field treated as zero.
    pub fn compute_checksum(block: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&block[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&block[Self::OFFSET_CHECKSUM + 4..]);
        hasher.finalize()
    }

    /// Verify that the stored checksum matches the block contents.
    pub fn verify_checksum(&self, block: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(block)
    }
}

#[inline]
pub(crate) fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn write_u64(data: &mut [u8], at: usize, value: u64) {
    data[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
pub(crate) fn write_u32(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_from_u32() {
        assert_eq!(NodeKind::from_u32(0), Some(NodeKind::Leaf));
        assert_eq!(NodeKind::from_u32(1), Some(NodeKind::Internal));
        assert_eq!(NodeKind::from_u32(7), None);
    }

    #[test]
    fn test_new_header_has_no_links() {
        let header = NodeHeader::new(NodeKind::Internal);
        assert_eq!(header.offset, None);
        assert_eq!(header.parent, None);
        assert_eq!(header.kind, NodeKind::Internal as u32);
        assert_eq!(header.count, 0);
    }

    #[test]
    fn test_header_byte_layout() {
        let header = NodeHeader {
            offset: Some(BlockOffset::new(0x0807060504030201)),
            parent: None,
            prev: Some(BlockOffset::new(128)),
            next: None,
            kind: NodeKind::Internal as u32,
            count: 3,
            checksum: 0x04030201,
        };

        let mut buffer = [0xAAu8; NodeHeader::SIZE];
        header.write_to(&mut buffer);

        assert_eq!(buffer[0], 0x01);
        assert_eq!(buffer[7], 0x08);
        // Absent parent is the all-ones sentinel.
        assert!(buffer[8..16].iter().all(|&b| b == 0xFF));
        assert_eq!(buffer[16], 128);
        assert_eq!(buffer[32], 1);
        assert_eq!(buffer[36], 3);
        assert_eq!(buffer[40], 0x01);
        assert!(buffer[44..48].iter().all(|&b| b == 0));

        assert_eq!(NodeHeader::from_bytes(&buffer), header);
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let mut block = [0u8; 128];
        block[60] = 0xAB;

        let checksum1 = NodeHeader::compute_checksum(&block);
        block[NodeHeader::OFFSET_CHECKSUM..NodeHeader::OFFSET_CHECKSUM + 4].fill(0xFF);
        let checksum2 = NodeHeader::compute_checksum(&block);

        assert_eq!(checksum1, checksum2);
    }

    #[test]
    fn test_checksum_detects_payload_change() {
        let mut block = [0u8; 128];
        let checksum = NodeHeader::compute_checksum(&block);
        block[100] = 1;
        assert_ne!(checksum, NodeHeader::compute_checksum(&block));
    }
}
