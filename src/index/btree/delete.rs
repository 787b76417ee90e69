//! Removal with borrow, merge, and root collapse.
//!
//! A non-root node that would drop below `(max + 1) / 2` after a removal
//! is refilled from a sibling under the same parent: one slot is borrowed
//! if the sibling can spare it, otherwise the two nodes merge and the
//! parent loses a separator, which may cascade upward. An internal root
//! left with a single child is replaced by that child.

use tracing::debug;

use crate::buffer::NodeGuard;
use crate::common::{BlockOffset, Error, Key, Result};
use crate::storage::node::Node;

use super::search::binary_search;
use super::BPlusTree;

/// Which sibling a rebalance draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Prefer the left sibling unless it is absent or smaller than the right.
fn choose_sibling(
    pos: usize,
    parent_count: usize,
    left: &Option<NodeGuard<'_>>,
    right: &Option<NodeGuard<'_>>,
) -> Side {
    if pos == 0 {
        return Side::Right;
    }
    if pos + 1 == parent_count {
        return Side::Left;
    }
    match (left, right) {
        (Some(l), Some(r)) if l.count() < r.count() => Side::Right,
        _ => Side::Left,
    }
}

/// Drop the leaf entry at `index`.
fn remove_entry(leaf: &mut Node, index: usize) {
    let count = leaf.count();
    leaf.copy_keys_within(index + 1..count, index);
    leaf.copy_values_within(index + 1..count, index);
    leaf.set_count(count - 1);
}

/// Drop separator `index` and the child to its right.
fn remove_child(node: &mut Node, index: usize) {
    let count = node.count();
    node.copy_keys_within(index + 1..count - 1, index);
    node.copy_children_within(index + 2..count, index + 1);
    node.set_count(count - 1);
}

impl BPlusTree {
    /// Remove `key` and its value.
    ///
    /// # Errors
    /// `KeyNotFound` if `key` is absent. The tree is unchanged.
    pub fn remove(&mut self, key: Key) -> Result<()> {
        self.guarded(|tree| tree.remove_key(key))
    }

    fn remove_key(&self, key: Key) -> Result<()> {
        let Some(leaf) = self.find_leaf(key)? else {
            return Err(Error::KeyNotFound(key));
        };
        let index = binary_search(&leaf, key).map_err(|_| Error::KeyNotFound(key))?;
        self.remove_from_leaf(leaf, index)
    }

    // ========================================================================
    // Leaf
    // ========================================================================

    fn remove_from_leaf(&self, mut leaf: NodeGuard<'_>, index: usize) -> Result<()> {
        let count = leaf.count();

        let Some(parent) = leaf.parent() else {
            if count == 1 {
                let root = leaf.offset();
                self.delete_node(leaf, None, None)?;
                self.set_root(None, 0);
                debug!(root = ?root, "btree.root.empty");
                return Ok(());
            }
            remove_entry(&mut leaf, index);
            return self.flush(leaf);
        };

        if count > self.layout.min_entries() {
            remove_entry(&mut leaf, index);
            return self.flush(leaf);
        }

        let offset = self.placed(&leaf)?;
        let parent = self.fetch(parent)?;
        let pos = parent
            .child_index(offset)
            .ok_or_else(|| Error::corrupt(offset, "leaf missing from its parent"))?;

        let prev = self.sibling(&parent, pos, Side::Left, leaf.prev())?;
        let next = self.sibling(&parent, pos, Side::Right, leaf.next())?;
        remove_entry(&mut leaf, index);

        match choose_sibling(pos, parent.count(), &prev, &next) {
            Side::Left => {
                let left = prev.ok_or_else(|| Error::corrupt(offset, "left sibling missing"))?;
                self.rebalance_leaf_left(leaf, left, next, parent, pos)
            }
            Side::Right => {
                drop(prev);
                let right = next.ok_or_else(|| Error::corrupt(offset, "right sibling missing"))?;
                self.rebalance_leaf_right(leaf, right, parent, pos)
            }
        }
    }

    fn rebalance_leaf_left(
        &self,
        mut leaf: NodeGuard<'_>,
        mut left: NodeGuard<'_>,
        next: Option<NodeGuard<'_>>,
        mut parent: NodeGuard<'_>,
        pos: usize,
    ) -> Result<()> {
        let min = self.layout.min_entries();
        let count = leaf.count();
        let left_count = left.count();

        if left_count > min {
            drop(next);
            leaf.copy_keys_within(0..count, 1);
            leaf.copy_values_within(0..count, 1);
            leaf.set_key(0, left.key(left_count - 1));
            leaf.set_value(0, left.value(left_count - 1));
            leaf.set_count(count + 1);
            left.set_count(left_count - 1);
            parent.set_key(pos - 1, leaf.key(0));

            debug!(leaf = ?leaf.offset(), from = ?left.offset(), "btree.borrow.leaf");
            self.flush(left)?;
            self.flush(leaf)?;
            return self.flush(parent);
        }

        left.copy_keys_from(&leaf, 0..count, left_count);
        left.copy_values_from(&leaf, 0..count, left_count);
        left.set_count(left_count + count);

        debug!(leaf = ?leaf.offset(), into = ?left.offset(), "btree.merge.leaf");
        self.delete_node(leaf, Some(left), next)?;
        self.remove_from_internal(parent, pos - 1)
    }

    fn rebalance_leaf_right(
        &self,
        mut leaf: NodeGuard<'_>,
        mut right: NodeGuard<'_>,
        mut parent: NodeGuard<'_>,
        pos: usize,
    ) -> Result<()> {
        let min = self.layout.min_entries();
        let count = leaf.count();
        let right_count = right.count();

        if right_count > min {
            leaf.set_key(count, right.key(0));
            leaf.set_value(count, right.value(0));
            leaf.set_count(count + 1);
            remove_entry(&mut right, 0);
            parent.set_key(pos, right.key(0));

            debug!(leaf = ?leaf.offset(), from = ?right.offset(), "btree.borrow.leaf");
            self.flush(right)?;
            self.flush(leaf)?;
            return self.flush(parent);
        }

        leaf.copy_keys_from(&right, 0..right_count, count);
        leaf.copy_values_from(&right, 0..right_count, count);
        leaf.set_count(count + right_count);

        debug!(leaf = ?right.offset(), into = ?leaf.offset(), "btree.merge.leaf");
        let far = self.fetch_link(right.next())?;
        self.delete_node(right, Some(leaf), far)?;
        self.remove_from_internal(parent, pos)
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Remove separator `index` and child `index + 1` from `node`.
    fn remove_from_internal(&self, mut node: NodeGuard<'_>, index: usize) -> Result<()> {
        let count = node.count();

        let Some(parent) = node.parent() else {
            if count == 2 {
                return self.collapse_root(node);
            }
            remove_child(&mut node, index);
            return self.flush(node);
        };

        if count > self.layout.min_order() {
            remove_child(&mut node, index);
            return self.flush(node);
        }

        let offset = self.placed(&node)?;
        let parent = self.fetch(parent)?;
        let pos = parent
            .child_index(offset)
            .ok_or_else(|| Error::corrupt(offset, "node missing from its parent"))?;

        let prev = self.sibling(&parent, pos, Side::Left, node.prev())?;
        let next = self.sibling(&parent, pos, Side::Right, node.next())?;
        remove_child(&mut node, index);

        match choose_sibling(pos, parent.count(), &prev, &next) {
            Side::Left => {
                let left = prev.ok_or_else(|| Error::corrupt(offset, "left sibling missing"))?;
                self.rebalance_internal_left(node, left, next, parent, pos)
            }
            Side::Right => {
                drop(prev);
                let right = next.ok_or_else(|| Error::corrupt(offset, "right sibling missing"))?;
                self.rebalance_internal_right(node, right, parent, pos)
            }
        }
    }

    fn rebalance_internal_left(
        &self,
        mut node: NodeGuard<'_>,
        mut left: NodeGuard<'_>,
        next: Option<NodeGuard<'_>>,
        mut parent: NodeGuard<'_>,
        pos: usize,
    ) -> Result<()> {
        let min = self.layout.min_order();
        let count = node.count();
        let left_count = left.count();

        if left_count > min {
            drop(next);
            node.copy_keys_within(0..count - 1, 1);
            node.copy_children_within(0..count, 1);
            node.set_key(0, parent.key(pos - 1));
            node.set_child(0, left.child(left_count - 1));
            node.set_count(count + 1);
            parent.set_key(pos - 1, left.key(left_count - 2));
            left.set_count(left_count - 1);

            debug!(node = ?node.offset(), from = ?left.offset(), "btree.borrow.internal");
            self.flush(left)?;
            self.flush(parent)?;
            self.reparent_children(&node, 0..1)?;
            return self.flush(node);
        }

        left.set_key(left_count - 1, parent.key(pos - 1));
        left.copy_keys_from(&node, 0..count - 1, left_count);
        left.copy_children_from(&node, 0..count, left_count);
        left.set_count(left_count + count);

        debug!(node = ?node.offset(), into = ?left.offset(), "btree.merge.internal");
        self.reparent_children(&left, left_count..left_count + count)?;
        self.delete_node(node, Some(left), next)?;
        self.remove_from_internal(parent, pos - 1)
    }

    fn rebalance_internal_right(
        &self,
        mut node: NodeGuard<'_>,
        mut right: NodeGuard<'_>,
        mut parent: NodeGuard<'_>,
        pos: usize,
    ) -> Result<()> {
        let min = self.layout.min_order();
        let count = node.count();
        let right_count = right.count();

        if right_count > min {
            node.set_key(count - 1, parent.key(pos));
            node.set_child(count, right.child(0));
            node.set_count(count + 1);
            parent.set_key(pos, right.key(0));
            right.copy_keys_within(1..right_count - 1, 0);
            right.copy_children_within(1..right_count, 0);
            right.set_count(right_count - 1);

            debug!(node = ?node.offset(), from = ?right.offset(), "btree.borrow.internal");
            self.flush(right)?;
            self.flush(parent)?;
            self.reparent_children(&node, count..count + 1)?;
            return self.flush(node);
        }

        node.set_key(count - 1, parent.key(pos));
        node.copy_keys_from(&right, 0..right_count - 1, count);
        node.copy_children_from(&right, 0..right_count, count);
        node.set_count(count + right_count);

        debug!(node = ?right.offset(), into = ?node.offset(), "btree.merge.internal");
        self.reparent_children(&node, count..count + right_count)?;
        let far = self.fetch_link(right.next())?;
        self.delete_node(right, Some(node), far)?;
        self.remove_from_internal(parent, pos)
    }

    /// Replace a two-child root with its remaining left child.
    ///
    /// Only reached when separator 0 is being removed, so child 0 survives.
    fn collapse_root(&self, root: NodeGuard<'_>) -> Result<()> {
        let old = self.placed(&root)?;
        let child = root
            .child(0)
            .ok_or_else(|| Error::corrupt(old, "root without children"))?;
        self.reparent(child, None)?;
        self.delete_node(root, None, None)?;

        let level = self.level().saturating_sub(1);
        self.set_root(Some(child), level);
        debug!(old = %old, root = %child, level, "btree.root.collapse");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn placed(&self, node: &Node) -> Result<BlockOffset> {
        node.offset()
            .ok_or_else(|| Error::corrupt(BlockOffset::INVALID, "unplaced node in tree"))
    }

    /// Fetch the neighbour on `side` through its level link.
    ///
    /// A neighbour under the same parent must sit in the adjacent parent
    /// slot; one under a different parent is a cousin, kept only for
    /// relinking.
    fn sibling(
        &self,
        parent: &Node,
        pos: usize,
        side: Side,
        link: Option<BlockOffset>,
    ) -> Result<Option<NodeGuard<'_>>> {
        let expected = match side {
            Side::Left => pos.checked_sub(1).and_then(|slot| parent.child(slot)),
            Side::Right if pos + 1 < parent.count() => parent.child(pos + 1),
            Side::Right => None,
        };
        if let Some(expected) = expected {
            if link != Some(expected) {
                return Err(Error::corrupt(expected, "sibling link disagrees with parent"));
            }
        }
        self.fetch_link(link)
    }
}
