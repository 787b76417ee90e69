//! Structural invariant checker.

use std::collections::HashSet;

use crate::common::{BlockOffset, Error, Key, Result};

use super::BPlusTree;

/// Shape of a tree that passed [`BPlusTree::verify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeReport {
    /// Nodes on every root-to-leaf path.
    pub level: usize,
    pub leaves: usize,
    pub internal_nodes: usize,
    /// Key/value pairs stored.
    pub entries: usize,
}

/// A node waiting to be visited, with the key bounds its parent implies.
struct Pending {
    offset: BlockOffset,
    parent: Option<BlockOffset>,
    depth: usize,
    /// Inclusive lower bound.
    low: Option<Key>,
    /// Exclusive upper bound.
    high: Option<Key>,
}

/// Links of a visited node, recorded per depth in traversal order.
struct Visited {
    offset: BlockOffset,
    prev: Option<BlockOffset>,
    next: Option<BlockOffset>,
}

fn violation(message: String) -> Error {
    Error::InvariantViolation(message)
}

impl BPlusTree {
    /// Walk the whole tree and check its invariants.
    ///
    /// Checked: strict key order, separator bounds, parent links, occupancy
    /// bounds, uniform leaf depth equal to [`level`](Self::level), sibling
    /// chains at every depth matching traversal order, and that no
    /// reachable block is on the free list.
    ///
    /// # Errors
    /// `InvariantViolation` describing the first broken invariant, or any
    /// read error.
    pub fn verify(&self) -> Result<TreeReport> {
        let level = self.level();
        let Some(root) = self.root() else {
            if level != 0 {
                return Err(violation(format!("empty tree has level {}", level)));
            }
            return Ok(TreeReport::default());
        };

        let mut report = TreeReport {
            level,
            ..TreeReport::default()
        };
        let mut seen = HashSet::new();
        let mut levels: Vec<Vec<Visited>> = (0..level).map(|_| Vec::new()).collect();
        let mut stack = vec![Pending {
            offset: root,
            parent: None,
            depth: 1,
            low: None,
            high: None,
        }];

        while let Some(pending) = stack.pop() {
            let offset = pending.offset;
            if !seen.insert(offset) {
                return Err(violation(format!("{} reachable twice", offset)));
            }
            if self.store.lock().free_list().contains(offset) {
                return Err(violation(format!("{} is reachable but free", offset)));
            }
            if pending.depth > level {
                return Err(violation(format!(
                    "{} at depth {} below level {}",
                    offset, pending.depth, level
                )));
            }

            let node = self.fetch(offset)?;
            if node.parent() != pending.parent {
                return Err(violation(format!(
                    "{} has parent {:?}, expected {:?}",
                    offset,
                    node.parent(),
                    pending.parent
                )));
            }

            let count = node.count();
            let is_root = pending.parent.is_none();
            let (min, max) = if node.is_leaf() {
                let min = if is_root { 1 } else { self.layout.min_entries() };
                (min, self.layout.max_entries())
            } else {
                let min = if is_root { 2 } else { self.layout.min_order() };
                (min, self.layout.max_order())
            };
            if count < min || count > max {
                return Err(violation(format!(
                    "{} holds {} slots, allowed {}..={}",
                    offset, count, min, max
                )));
            }

            let keys: Vec<Key> = (0..node.key_count()).map(|i| node.key(i)).collect();
            if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(violation(format!("{} keys out of order: {:?}", offset, keys)));
            }
            if let (Some(low), Some(&first)) = (pending.low, keys.first()) {
                if first < low {
                    return Err(violation(format!("{} key {} below bound {}", offset, first, low)));
                }
            }
            if let (Some(high), Some(&last)) = (pending.high, keys.last()) {
                if last >= high {
                    return Err(violation(format!("{} key {} not below bound {}", offset, last, high)));
                }
            }

            levels[pending.depth - 1].push(Visited {
                offset,
                prev: node.prev(),
                next: node.next(),
            });

            if node.is_leaf() {
                if pending.depth != level {
                    return Err(violation(format!(
                        "leaf {} at depth {}, level is {}",
                        offset, pending.depth, level
                    )));
                }
                report.leaves += 1;
                report.entries += count;
                continue;
            }

            report.internal_nodes += 1;
            // Reverse so the leftmost child is visited first.
            for slot in (0..count).rev() {
                let child = node
                    .child(slot)
                    .ok_or_else(|| violation(format!("{} child {} is empty", offset, slot)))?;
                stack.push(Pending {
                    offset: child,
                    parent: Some(offset),
                    depth: pending.depth + 1,
                    low: if slot == 0 { pending.low } else { Some(keys[slot - 1]) },
                    high: if slot + 1 == count { pending.high } else { Some(keys[slot]) },
                });
            }
        }

        for (depth, nodes) in levels.iter().enumerate() {
            check_chain(depth + 1, nodes)?;
        }
        Ok(report)
    }

    /// Keys of every leaf, left to right along the leaf chain.
    #[cfg(test)]
    pub(crate) fn leaf_keys(&self) -> Result<Vec<Vec<Key>>> {
        let Some(mut offset) = self.root() else {
            return Ok(Vec::new());
        };
        loop {
            let node = self.fetch(offset)?;
            if node.is_leaf() {
                break;
            }
            offset = node
                .child(0)
                .ok_or_else(|| violation("empty child".to_string()))?;
        }

        let mut leaves = Vec::new();
        let mut link = Some(offset);
        while let Some(offset) = link {
            let leaf = self.fetch(offset)?;
            leaves.push((0..leaf.count()).map(|i| leaf.key(i)).collect());
            link = leaf.next();
        }
        Ok(leaves)
    }
}

/// Check that the prev/next links at one depth form a single chain in
/// traversal order.
fn check_chain(depth: usize, nodes: &[Visited]) -> Result<()> {
    for (i, node) in nodes.iter().enumerate() {
        let prev = i.checked_sub(1).map(|j| nodes[j].offset);
        let next = nodes.get(i + 1).map(|n| n.offset);
        if node.prev != prev || node.next != next {
            return Err(violation(format!(
                "depth {}: {} linked {:?} <-> {:?}, expected {:?} <-> {:?}",
                depth, node.offset, node.prev, node.next, prev, next
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Value;
    use tempfile::tempdir;

    #[test]
    fn test_verify_empty_tree() {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        assert_eq!(tree.verify().unwrap(), TreeReport::default());
    }

    #[test]
    fn test_verify_counts_nodes() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        for key in 1..=7 {
            tree.put(key, key as Value).unwrap();
        }

        let report = tree.verify().unwrap();
        assert_eq!(
            report,
            TreeReport {
                level: 2,
                leaves: 2,
                internal_nodes: 1,
                entries: 7,
            }
        );
    }

    #[test]
    fn test_verify_detects_broken_order() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        for key in 1..=4 {
            tree.put(key, key as Value).unwrap();
        }

        // Swap two keys directly in the root leaf.
        let root = tree.root().unwrap();
        let mut leaf = tree.fetch(root).unwrap();
        leaf.set_key(0, 3);
        leaf.set_key(2, 1);
        tree.flush(leaf).unwrap();

        assert!(matches!(tree.verify(), Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_verify_detects_broken_chain() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        for key in 1..=7 {
            tree.put(key, key as Value).unwrap();
        }

        let first = tree.fetch(BlockOffset::new(0)).unwrap();
        let second = first.next().unwrap();
        drop(first);
        let mut leaf = tree.fetch(second).unwrap();
        leaf.set_prev(None);
        tree.flush(leaf).unwrap();

        assert!(matches!(tree.verify(), Err(Error::InvariantViolation(_))));
    }
}
