//! Node search and root-to-leaf descent.

use std::cmp::Ordering;

use crate::buffer::NodeGuard;
use crate::common::{Error, Key, Result, Value};
use crate::storage::node::Node;

use super::BPlusTree;

/// Binary search over a node's keys.
///
/// Returns `Ok(index)` on an exact match, otherwise `Err(insertion_point)`.
/// Leaves search `count` keys, internal nodes `count - 1`.
pub(crate) fn binary_search(node: &Node, key: Key) -> std::result::Result<usize, usize> {
    let mut low = 0;
    let mut high = node.key_count();
    while low < high {
        let mid = low + (high - low) / 2;
        match node.key(mid).cmp(&key) {
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid,
            Ordering::Equal => return Ok(mid),
        }
    }
    Err(low)
}

/// Child slot an internal node routes `key` to.
///
/// An exact separator match goes to the pointer on its right.
#[inline]
pub(crate) fn child_slot(node: &Node, key: Key) -> usize {
    match binary_search(node, key) {
        Ok(index) => index + 1,
        Err(index) => index,
    }
}

impl BPlusTree {
    /// Look up the value stored under `key`.
    pub fn get(&self, key: Key) -> Result<Option<Value>> {
        self.guarded(|tree| {
            let Some(leaf) = tree.find_leaf(key)? else {
                return Ok(None);
            };
            Ok(binary_search(&leaf, key).ok().map(|index| leaf.value(index)))
        })
    }

    /// Value of the largest key in `[key1, key2]`, bounds in either order.
    ///
    /// `None` when no key falls in the range.
    pub fn get_range(&self, key1: Key, key2: Key) -> Result<Option<Value>> {
        let mut last = None;
        self.guarded(|tree| tree.scan(key1, key2, |_, value| last = Some(value)))?;
        Ok(last)
    }

    /// Every entry in `[key1, key2]` in ascending key order, bounds in
    /// either order.
    pub fn range(&self, key1: Key, key2: Key) -> Result<Vec<(Key, Value)>> {
        let mut entries = Vec::new();
        self.guarded(|tree| tree.scan(key1, key2, |key, value| entries.push((key, value))))?;
        Ok(entries)
    }

    /// Walk the leaf chain from the first key `>= low` while keys are
    /// `<= high`.
    fn scan(&self, key1: Key, key2: Key, mut visit: impl FnMut(Key, Value)) -> Result<()> {
        let (low, high) = if key1 <= key2 { (key1, key2) } else { (key2, key1) };

        let Some(mut leaf) = self.find_leaf(low)? else {
            return Ok(());
        };
        let mut start = match binary_search(&leaf, low) {
            Ok(index) | Err(index) => index,
        };

        loop {
            for index in start..leaf.count() {
                let key = leaf.key(index);
                if key > high {
                    return Ok(());
                }
                visit(key, leaf.value(index));
            }
            let next = leaf.next();
            drop(leaf);
            match self.fetch_link(next)? {
                Some(guard) => leaf = guard,
                None => return Ok(()),
            }
            start = 0;
        }
    }

    /// Descend from the root to the leaf that owns `key`.
    ///
    /// Only one node is held at a time. `None` when the tree is empty.
    pub(super) fn find_leaf(&self, key: Key) -> Result<Option<NodeGuard<'_>>> {
        let (Some(root), level) = ({
            let state = self.state.lock();
            (state.root, state.level)
        }) else {
            return Ok(None);
        };

        let mut node = self.fetch(root)?;
        for _ in 1..level {
            if node.is_leaf() {
                break;
            }
            let slot = child_slot(&node, key);
            let child = node.child(slot);
            let offset = node.offset();
            drop(node);
            node = self.fetch(child.ok_or_else(|| {
                Error::corrupt(offset.unwrap_or(root), "empty child slot on descent")
            })?)?;
        }

        if !node.is_leaf() {
            return Err(Error::corrupt(
                node.offset().unwrap_or(root),
                "descent deeper than tree level",
            ));
        }
        Ok(Some(node))
    }
}
