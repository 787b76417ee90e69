//! Node - one block image with typed accessors.
//!
//! A [`Node`] owns a `block_size` byte buffer and reads and writes its
//! header and payload fields in place. Nodes live in the frames of the
//! node cache and are the unit of I/O with the block store.

use std::ops::Range;

use crate::common::config::{KEY_SIZE, OFFSET_SIZE, VALUE_SIZE};
use crate::common::{BlockOffset, Key, Value};

use super::header::{read_u32, read_u64, write_u32, write_u64, NodeHeader, NodeKind};
use super::layout::NodeLayout;

/// A block-sized node buffer.
///
/// All accessors index straight into the byte image; there is no separate
/// decoded form to keep in sync. Key and value slots beyond `count` hold
/// stale data and are never interpreted.
///
/// # Example
/// ```
/// use bplus_index::storage::node::{Node, NodeKind, NodeLayout};
///
/// let mut node = Node::new(NodeLayout::new(128).unwrap());
/// node.init(NodeKind::Leaf);
/// node.set_key(0, 7);
/// node.set_value(0, 70);
/// node.set_count(1);
/// assert_eq!(node.key(0), 7);
/// assert_eq!(node.value(0), 70);
/// ```
pub struct Node {
    layout: NodeLayout,
    data: Box<[u8]>,
}

impl Node {
    /// Create a zeroed buffer for `layout`.
    pub fn new(layout: NodeLayout) -> Self {
        Self {
            layout,
            data: vec![0u8; layout.block_size()].into_boxed_slice(),
        }
    }

    /// Reset to an empty, unplaced node of `kind`.
    pub fn init(&mut self, kind: NodeKind) {
        self.data.fill(0);
        NodeHeader::new(kind).write_to(&mut self.data);
    }

    #[inline]
    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn header(&self) -> NodeHeader {
        NodeHeader::from_bytes(&self.data)
    }

    // ========================================================================
    // Header fields
    // ========================================================================

    /// This node's own block offset, `None` until placed.
    #[inline]
    pub fn offset(&self) -> Option<BlockOffset> {
        BlockOffset::from_raw(read_u64(&self.data, NodeHeader::OFFSET_SELF))
    }

    #[inline]
    pub fn set_offset(&mut self, offset: Option<BlockOffset>) {
        write_u64(&mut self.data, NodeHeader::OFFSET_SELF, BlockOffset::to_raw(offset));
    }

    #[inline]
    pub fn parent(&self) -> Option<BlockOffset> {
        BlockOffset::from_raw(read_u64(&self.data, NodeHeader::OFFSET_PARENT))
    }

    #[inline]
    pub fn set_parent(&mut self, parent: Option<BlockOffset>) {
        write_u64(&mut self.data, NodeHeader::OFFSET_PARENT, BlockOffset::to_raw(parent));
    }

    #[inline]
    pub fn prev(&self) -> Option<BlockOffset> {
        BlockOffset::from_raw(read_u64(&self.data, NodeHeader::OFFSET_PREV))
    }

    #[inline]
    pub fn set_prev(&mut self, prev: Option<BlockOffset>) {
        write_u64(&mut self.data, NodeHeader::OFFSET_PREV, BlockOffset::to_raw(prev));
    }

    #[inline]
    pub fn next(&self) -> Option<BlockOffset> {
        BlockOffset::from_raw(read_u64(&self.data, NodeHeader::OFFSET_NEXT))
    }

    #[inline]
    pub fn set_next(&mut self, next: Option<BlockOffset>) {
        write_u64(&mut self.data, NodeHeader::OFFSET_NEXT, BlockOffset::to_raw(next));
    }

    /// Decoded kind, `None` if the tag is unknown.
    #[inline]
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_u32(read_u32(&self.data, NodeHeader::OFFSET_KIND))
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind() == Some(NodeKind::Leaf)
    }

    /// Entries in a leaf, children in an internal node.
    #[inline]
    pub fn count(&self) -> usize {
        read_u32(&self.data, NodeHeader::OFFSET_COUNT) as usize
    }

    #[inline]
    pub fn set_count(&mut self, count: usize) {
        write_u32(&mut self.data, NodeHeader::OFFSET_COUNT, count as u32);
    }

    /// Number of keys stored: `count` for a leaf, `count - 1` otherwise.
    #[inline]
    pub fn key_count(&self) -> usize {
        if self.is_leaf() {
            self.count()
        } else {
            self.count().saturating_sub(1)
        }
    }

    /// Capacity for this node's kind.
    #[inline]
    pub fn capacity(&self) -> usize {
        if self.is_leaf() {
            self.layout.max_entries()
        } else {
            self.layout.max_order()
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity()
    }

    // ========================================================================
    // Payload slots
    // ========================================================================

    #[inline]
    pub fn key(&self, index: usize) -> Key {
        let at = self.layout.key_offset(index);
        read_u32(&self.data, at) as Key
    }

    #[inline]
    pub fn set_key(&mut self, index: usize, key: Key) {
        let at = self.layout.key_offset(index);
        write_u32(&mut self.data, at, key as u32);
    }

    #[inline]
    pub fn value(&self, index: usize) -> Value {
        let at = self.layout.value_offset(index);
        read_u64(&self.data, at) as Value
    }

    #[inline]
    pub fn set_value(&mut self, index: usize, value: Value) {
        let at = self.layout.value_offset(index);
        write_u64(&mut self.data, at, value as u64);
    }

    /// Child offset at `index`, `None` for an empty slot.
    #[inline]
    pub fn child(&self, index: usize) -> Option<BlockOffset> {
        let at = self.layout.child_offset(index);
        BlockOffset::from_raw(read_u64(&self.data, at))
    }

    #[inline]
    pub fn set_child(&mut self, index: usize, child: Option<BlockOffset>) {
        let at = self.layout.child_offset(index);
        write_u64(&mut self.data, at, BlockOffset::to_raw(child));
    }

    /// Slot of `child` among this node's children.
    pub fn child_index(&self, child: BlockOffset) -> Option<usize> {
        (0..self.count()).find(|&i| self.child(i) == Some(child))
    }

    // ========================================================================
    // Bulk moves
    // ========================================================================

    /// Shift keys `src` to start at `dest` within this node.
    pub fn copy_keys_within(&mut self, src: Range<usize>, dest: usize) {
        let layout = self.layout;
        self.data.copy_within(
            slot_range(layout.key_offset(0), KEY_SIZE, &src),
            layout.key_offset(dest),
        );
    }

    pub fn copy_values_within(&mut self, src: Range<usize>, dest: usize) {
        let layout = self.layout;
        self.data.copy_within(
            slot_range(layout.value_offset(0), VALUE_SIZE, &src),
            layout.value_offset(dest),
        );
    }

    pub fn copy_children_within(&mut self, src: Range<usize>, dest: usize) {
        let layout = self.layout;
        self.data.copy_within(
            slot_range(layout.child_offset(0), OFFSET_SIZE, &src),
            layout.child_offset(dest),
        );
    }

    /// Copy keys `src` of `other` into this node starting at `dest`.
    pub fn copy_keys_from(&mut self, other: &Node, src: Range<usize>, dest: usize) {
        let from = slot_range(self.layout.key_offset(0), KEY_SIZE, &src);
        let to = self.layout.key_offset(dest);
        self.data[to..to + from.len()].copy_from_slice(&other.data[from]);
    }

    pub fn copy_values_from(&mut self, other: &Node, src: Range<usize>, dest: usize) {
        let from = slot_range(self.layout.value_offset(0), VALUE_SIZE, &src);
        let to = self.layout.value_offset(dest);
        self.data[to..to + from.len()].copy_from_slice(&other.data[from]);
    }

    pub fn copy_children_from(&mut self, other: &Node, src: Range<usize>, dest: usize) {
        let from = slot_range(self.layout.child_offset(0), OFFSET_SIZE, &src);
        let to = self.layout.child_offset(dest);
        self.data[to..to + from.len()].copy_from_slice(&other.data[from]);
    }

    // ========================================================================
    // Checksum
    // ========================================================================

    /// Compute and store the checksum in the header.
    ///
    /// Call this after all modifications to the node are complete.
    pub fn update_checksum(&mut self) {
        let checksum = NodeHeader::compute_checksum(&self.data);
        write_u32(&mut self.data, NodeHeader::OFFSET_CHECKSUM, checksum);
    }

    pub fn verify_checksum(&self) -> bool {
        self.header().verify_checksum(&self.data)
    }
}

/// Byte range covering slots `slots` of an array starting at `base`.
#[inline]
fn slot_range(base: usize, width: usize, slots: &Range<usize>) -> Range<usize> {
    base + slots.start * width..base + slots.end * width
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<Key> = (0..self.key_count().min(self.capacity()))
            .map(|i| self.key(i))
            .collect();
        f.debug_struct("Node")
            .field("offset", &self.offset())
            .field("kind", &self.kind())
            .field("count", &self.count())
            .field("keys", &keys)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf() -> Node {
        let mut node = Node::new(NodeLayout::new(128).unwrap());
        node.init(NodeKind::Leaf);
        node
    }

    #[test]
    fn test_init_clears_links() {
        let mut node = leaf();
        node.set_parent(Some(BlockOffset::new(256)));
        node.init(NodeKind::Internal);

        assert_eq!(node.offset(), None);
        assert_eq!(node.parent(), None);
        assert_eq!(node.prev(), None);
        assert_eq!(node.next(), None);
        assert_eq!(node.kind(), Some(NodeKind::Internal));
        assert_eq!(node.count(), 0);
    }

    #[test]
    fn test_negative_keys_and_values() {
        let mut node = leaf();
        node.set_key(2, -15);
        node.set_value(2, i64::MIN);
        assert_eq!(node.key(2), -15);
        assert_eq!(node.value(2), i64::MIN);
    }

    #[test]
    fn test_key_count_by_kind() {
        let mut node = leaf();
        node.set_count(4);
        assert_eq!(node.key_count(), 4);

        node.init(NodeKind::Internal);
        node.set_count(4);
        assert_eq!(node.key_count(), 3);
    }

    #[test]
    fn test_copy_within_shifts_right() {
        let mut node = leaf();
        for i in 0..4 {
            node.set_key(i, i as Key * 10);
            node.set_value(i, i as Value * 100);
        }
        node.copy_keys_within(1..4, 2);
        node.copy_values_within(1..4, 2);

        assert_eq!(node.key(0), 0);
        assert_eq!(node.key(2), 10);
        assert_eq!(node.key(4), 30);
        assert_eq!(node.value(4), 300);
    }

    #[test]
    fn test_copy_from_other_node() {
        let mut node = Node::new(NodeLayout::new(128).unwrap());
        node.init(NodeKind::Internal);
        let mut other = Node::new(NodeLayout::new(128).unwrap());
        other.init(NodeKind::Internal);

        for i in 0..3 {
            other.set_child(i, Some(BlockOffset::new(128 * (i as u64 + 1))));
        }
        node.copy_children_from(&other, 1..3, 0);

        assert_eq!(node.child(0), Some(BlockOffset::new(256)));
        assert_eq!(node.child(1), Some(BlockOffset::new(384)));
    }

    #[test]
    fn test_child_index() {
        let mut node = Node::new(NodeLayout::new(128).unwrap());
        node.init(NodeKind::Internal);
        node.set_child(0, Some(BlockOffset::new(0)));
        node.set_child(1, Some(BlockOffset::new(128)));
        node.set_count(2);

        assert_eq!(node.child_index(BlockOffset::new(128)), Some(1));
        assert_eq!(node.child_index(BlockOffset::new(512)), None);
    }

    #[test]
    fn test_checksum_roundtrip() {
        let mut node = leaf();
        node.set_key(0, 99);
        node.set_count(1);
        node.update_checksum();
        assert!(node.verify_checksum());

        node.set_value(0, 1);
        assert!(!node.verify_checksum());
    }
}
