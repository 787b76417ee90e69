//! Insertion with split propagation.
//!
//! A full leaf splits into two leaves and hands a separator to its parent.
//! A full parent splits in turn, and a split of the root grows the tree by
//! one level. Splits always divide the `max + 1` combined slots so the
//! left node keeps `(max + 1) / 2` of them.

use tracing::debug;

use crate::buffer::NodeGuard;
use crate::common::config::EMPTY_VALUE;
use crate::common::{BlockOffset, Error, Key, Result, Value};
use crate::storage::node::NodeKind;

use super::search::binary_search;
use super::BPlusTree;

impl BPlusTree {
    /// Store `value` under `key`.
    ///
    /// A `value` equal to [`EMPTY_VALUE`] is treated as a request to remove
    /// `key`, so that value can never be stored through `put`. Use
    /// [`insert`](Self::insert) to store it.
    ///
    /// # Errors
    /// `DuplicateKey` if `key` is present; `KeyNotFound` if `value` is
    /// the empty marker and `key` is absent.
    pub fn put(&mut self, key: Key, value: Value) -> Result<()> {
        if value == EMPTY_VALUE {
            return self.remove(key);
        }
        self.insert(key, value)
    }

    /// Store `value` under `key` with no reserved values.
    ///
    /// # Errors
    /// `DuplicateKey` if `key` is present. The tree is unchanged.
    pub fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.guarded(|tree| tree.insert_key(key, value))
    }

    fn insert_key(&self, key: Key, value: Value) -> Result<()> {
        let Some(mut leaf) = self.find_leaf(key)? else {
            return self.create_root_leaf(key, value);
        };

        let index = match binary_search(&leaf, key) {
            Ok(_) => return Err(Error::DuplicateKey(key)),
            Err(index) => index,
        };

        if leaf.is_full() {
            return self.split_leaf(leaf, index, key, value);
        }

        let count = leaf.count();
        leaf.copy_keys_within(index..count, index + 1);
        leaf.copy_values_within(index..count, index + 1);
        leaf.set_key(index, key);
        leaf.set_value(index, value);
        leaf.set_count(count + 1);
        self.flush(leaf)
    }

    fn create_root_leaf(&self, key: Key, value: Value) -> Result<()> {
        let mut leaf = self.new_node(NodeKind::Leaf)?;
        leaf.set_key(0, key);
        leaf.set_value(0, value);
        leaf.set_count(1);
        let root = leaf.offset();
        self.flush(leaf)?;

        self.set_root(root, 1);
        debug!(root = ?root, "btree.root.create");
        Ok(())
    }

    // ========================================================================
    // Leaf split
    // ========================================================================

    /// Split a full leaf while inserting `key` at `index`.
    ///
    /// With `split = (max + 1) / 2`, an insertion left of `split` moves the
    /// low half into a new left sibling; otherwise the high half moves into
    /// a new right sibling. Either way the left leaf ends with `split`
    /// entries and the right leaf with the remaining `max + 1 - split`.
    fn split_leaf(&self, mut leaf: NodeGuard<'_>, index: usize, key: Key, value: Value) -> Result<()> {
        let max = self.layout.max_entries();
        let split = (max + 1) / 2;

        if index < split {
            let mut left = self.new_node(NodeKind::Leaf)?;
            self.link_left(&mut left, &mut leaf)?;

            left.copy_keys_from(&leaf, 0..index, 0);
            left.copy_values_from(&leaf, 0..index, 0);
            left.set_key(index, key);
            left.set_value(index, value);
            left.copy_keys_from(&leaf, index..split - 1, index + 1);
            left.copy_values_from(&leaf, index..split - 1, index + 1);
            left.set_count(split);

            leaf.copy_keys_within(split - 1..max, 0);
            leaf.copy_values_within(split - 1..max, 0);
            leaf.set_count(max - split + 1);

            let separator = leaf.key(0);
            debug!(
                leaf = ?leaf.offset(),
                sibling = ?left.offset(),
                separator,
                side = "left",
                "btree.split.leaf"
            );
            self.build_parent(left, leaf, separator)
        } else {
            let mut right = self.new_node(NodeKind::Leaf)?;
            self.link_right(&mut leaf, &mut right)?;

            let pivot = index - split;
            right.copy_keys_from(&leaf, split..index, 0);
            right.copy_values_from(&leaf, split..index, 0);
            right.set_key(pivot, key);
            right.set_value(pivot, value);
            right.copy_keys_from(&leaf, index..max, pivot + 1);
            right.copy_values_from(&leaf, index..max, pivot + 1);
            right.set_count(max - split + 1);

            leaf.set_count(split);

            let separator = right.key(0);
            debug!(
                leaf = ?leaf.offset(),
                sibling = ?right.offset(),
                separator,
                side = "right",
                "btree.split.leaf"
            );
            self.build_parent(leaf, right, separator)
        }
    }

    // ========================================================================
    // Propagation
    // ========================================================================

    /// Hook a freshly split pair into the level above.
    ///
    /// A rootless pair gets a new root; otherwise the separator goes into
    /// the existing parent, which may split in turn.
    fn build_parent(&self, left: NodeGuard<'_>, right: NodeGuard<'_>, key: Key) -> Result<()> {
        match left.parent().or(right.parent()) {
            Some(parent) => {
                let parent = self.fetch(parent)?;
                self.insert_internal(parent, left, right, key)
            }
            None => {
                let mut root = self.new_node(NodeKind::Internal)?;
                root.set_key(0, key);
                self.attach_child(&mut root, 0, left)?;
                self.attach_child(&mut root, 1, right)?;
                root.set_count(2);
                let offset = root.offset();
                self.flush(root)?;

                let level = self.level() + 1;
                self.set_root(offset, level);
                debug!(root = ?offset, level, "btree.root.grow");
                Ok(())
            }
        }
    }

    /// Place `key` between `left` and `right` in `node`.
    ///
    /// One of the pair already occupies the slot the separator routes to;
    /// the other is new to this node.
    fn insert_internal(
        &self,
        mut node: NodeGuard<'_>,
        left: NodeGuard<'_>,
        right: NodeGuard<'_>,
        key: Key,
    ) -> Result<()> {
        let offset = node.offset().unwrap_or(BlockOffset::INVALID);
        let index = binary_search(&node, key)
            .err()
            .ok_or_else(|| Error::corrupt(offset, "separator already present"))?;
        let occupant = node.child(index);
        if occupant != left.offset() && occupant != right.offset() {
            return Err(Error::corrupt(offset, "split pair not under its parent"));
        }

        if node.is_full() {
            return self.split_internal(node, index, left, right, key);
        }

        let count = node.count();
        node.copy_keys_within(index..count - 1, index + 1);
        node.copy_children_within(index + 1..count, index + 2);
        node.set_key(index, key);
        self.attach_child(&mut node, index, left)?;
        self.attach_child(&mut node, index + 1, right)?;
        node.set_count(count + 1);
        self.flush(node)
    }

    // ========================================================================
    // Internal split
    // ========================================================================

    /// Split a full internal node while inserting the pair at `index`.
    ///
    /// The combined `max + 1` children are divided at `split = (max + 1) / 2`.
    /// Where the new right child (slot `index + 1`) lands decides the case:
    /// - left of `split`: the low part moves to a new left sibling and an
    ///   existing separator is promoted
    /// - at `split`: the pair straddles the cut and `key` itself is promoted
    /// - right of `split`: the high part moves to a new right sibling and an
    ///   existing separator is promoted
    fn split_internal(
        &self,
        mut node: NodeGuard<'_>,
        index: usize,
        left: NodeGuard<'_>,
        right: NodeGuard<'_>,
        key: Key,
    ) -> Result<()> {
        let max = self.layout.max_order();
        let split = (max + 1) / 2;

        if index + 1 < split {
            let mut sibling = self.new_node(NodeKind::Internal)?;
            self.link_left(&mut sibling, &mut node)?;

            sibling.copy_children_from(&node, 0..index, 0);
            sibling.copy_keys_from(&node, 0..index, 0);
            sibling.set_key(index, key);
            sibling.copy_children_from(&node, index + 1..split - 1, index + 2);
            sibling.copy_keys_from(&node, index..split - 2, index + 1);
            sibling.set_count(split);

            let promoted = node.key(split - 2);
            node.copy_children_within(split - 1..max, 0);
            node.copy_keys_within(split - 1..max - 1, 0);
            node.set_count(max + 1 - split);

            self.attach_child(&mut sibling, index, left)?;
            self.attach_child(&mut sibling, index + 1, right)?;
            self.reparent_children(&sibling, 0..index)?;
            self.reparent_children(&sibling, index + 2..split)?;

            debug!(
                node = ?node.offset(),
                sibling = ?sibling.offset(),
                promoted,
                side = "left",
                "btree.split.internal"
            );
            self.build_parent(sibling, node, promoted)
        } else if index + 1 == split {
            let mut sibling = self.new_node(NodeKind::Internal)?;
            self.link_right(&mut node, &mut sibling)?;

            sibling.copy_children_from(&node, index + 1..max, 1);
            sibling.copy_keys_from(&node, index..max - 1, 0);
            sibling.set_count(max - index);
            node.set_count(split);

            self.attach_child(&mut node, index, left)?;
            self.attach_child(&mut sibling, 0, right)?;
            self.reparent_children(&sibling, 1..max - index)?;

            debug!(
                node = ?node.offset(),
                sibling = ?sibling.offset(),
                promoted = key,
                side = "middle",
                "btree.split.internal"
            );
            self.build_parent(node, sibling, key)
        } else {
            let mut sibling = self.new_node(NodeKind::Internal)?;
            self.link_right(&mut node, &mut sibling)?;

            let pivot = index - split;
            let promoted = node.key(split - 1);
            sibling.copy_children_from(&node, split..index, 0);
            sibling.copy_keys_from(&node, split..index, 0);
            sibling.set_key(pivot, key);
            sibling.copy_children_from(&node, index + 1..max, pivot + 2);
            sibling.copy_keys_from(&node, index..max - 1, pivot + 1);
            sibling.set_count(max + 1 - split);
            node.set_count(split);

            self.attach_child(&mut sibling, pivot, left)?;
            self.attach_child(&mut sibling, pivot + 1, right)?;
            self.reparent_children(&sibling, 0..pivot)?;
            self.reparent_children(&sibling, pivot + 2..max + 1 - split)?;

            debug!(
                node = ?node.offset(),
                sibling = ?sibling.offset(),
                promoted,
                side = "right",
                "btree.split.internal"
            );
            self.build_parent(node, sibling, promoted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_small(dir: &tempfile::TempDir) -> BPlusTree {
        BPlusTree::open(dir.path().join("t.idx"), 128).unwrap()
    }

    #[test]
    fn test_first_insert_creates_root_leaf() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(&dir);

        tree.put(5, 50).unwrap();
        assert_eq!(tree.level(), 1);
        assert_eq!(tree.root(), Some(BlockOffset::new(0)));
        assert_eq!(tree.get(5).unwrap(), Some(50));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(&dir);

        tree.put(5, 50).unwrap();
        assert!(matches!(tree.put(5, 51), Err(Error::DuplicateKey(5))));
        assert_eq!(tree.get(5).unwrap(), Some(50));
    }

    #[test]
    fn test_put_empty_value_removes() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(&dir);

        tree.put(5, 50).unwrap();
        tree.put(5, EMPTY_VALUE).unwrap();
        assert_eq!(tree.get(5).unwrap(), None);
        assert!(matches!(
            tree.put(6, EMPTY_VALUE),
            Err(Error::KeyNotFound(6))
        ));
    }

    #[test]
    fn test_insert_stores_empty_value() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(&dir);

        tree.insert(5, EMPTY_VALUE).unwrap();
        assert_eq!(tree.get(5).unwrap(), Some(EMPTY_VALUE));
    }

    #[test]
    fn test_leaf_split_right() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(&dir);

        for key in 1..=7 {
            tree.put(key, key as Value).unwrap();
        }
        assert_eq!(tree.level(), 2);

        let leaves = tree.leaf_keys().unwrap();
        assert_eq!(leaves, vec![vec![1, 2, 3], vec![4, 5, 6, 7]]);
    }

    #[test]
    fn test_leaf_split_left() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(&dir);

        for key in (1..=7).rev() {
            tree.put(key, key as Value).unwrap();
        }
        assert_eq!(tree.level(), 2);

        let leaves = tree.leaf_keys().unwrap();
        assert_eq!(leaves, vec![vec![1, 2, 3], vec![4, 5, 6, 7]]);
        tree.verify().unwrap();
    }

    #[test]
    fn test_internal_split_grows_root() {
        let dir = tempdir().unwrap();
        let mut tree = open_small(&dir);

        for key in 0..200 {
            tree.put(key, 1 + key as Value).unwrap();
        }
        assert!(tree.level() >= 3);
        let report = tree.verify().unwrap();
        assert_eq!(report.entries, 200);
        assert!(tree.cache_peak() <= 5);
    }

    #[test]
    fn test_internal_split_all_positions() {
        // Interleaved order exercises every internal split case.
        let dir = tempdir().unwrap();
        let mut tree = open_small(&dir);

        let mut keys: Vec<Key> = (0..300).map(|i| (i * 37) % 300).collect();
        keys.extend(300..340);
        for &key in &keys {
            tree.put(key, key as Value + 1).unwrap();
            tree.verify().unwrap();
        }
        for &key in &keys {
            assert_eq!(tree.get(key).unwrap(), Some(key as Value + 1));
        }
        assert!(tree.cache_peak() <= 5);
    }
}
