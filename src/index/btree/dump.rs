//! Depth-indented diagnostic dump.
//!
//! ```text
//! node: 7
//! +-------node: 4
//! |       +-------leaf: 1 2 3
//! |       +-------leaf: 4 5 6
//! +-------node: 10
//!         +-------leaf: 7 8 9
//!         +-------leaf: 10 11 12
//! ```

use std::io::Write;

use crate::common::{BlockOffset, Error, Result};
use crate::storage::node::Node;

use super::BPlusTree;

/// Resume point for one level of the traversal.
#[derive(Debug, Clone, Copy)]
struct Backlog {
    /// Node to come back to, `None` once its children are exhausted.
    offset: Option<BlockOffset>,
    /// Child to descend into on return.
    next_child: usize,
}

impl BPlusTree {
    /// Render the tree as text, one node per line.
    pub fn dump(&self) -> Result<String> {
        let mut out = Vec::new();
        self.dump_to(&mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Write the dump to `out`.
    ///
    /// The walk keeps one backlog entry per level, bounded by
    /// [`level`](Self::level), and holds one node buffer at a time.
    ///
    /// # Errors
    /// `InvariantViolation` if a path runs deeper than the tree's level.
    pub fn dump_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let level = self.level();
        let mut backlog: Vec<Backlog> = Vec::with_capacity(level);
        let mut current = self.root();
        let mut child = 0;

        loop {
            let Some(offset) = current else {
                match backlog.pop() {
                    Some(entry) => {
                        current = entry.offset;
                        child = entry.next_child;
                        continue;
                    }
                    None => return Ok(()),
                }
            };

            if backlog.len() == level {
                return Err(Error::InvariantViolation(format!(
                    "{} lies below tree level {}",
                    offset, level
                )));
            }

            let node = self.fetch(offset)?;
            let leaf = node.is_leaf();
            backlog.push(if leaf || child + 1 >= node.count() {
                Backlog {
                    offset: None,
                    next_child: 0,
                }
            } else {
                Backlog {
                    offset: Some(offset),
                    next_child: child + 1,
                }
            });

            if child == 0 {
                draw(out, &node, &backlog)?;
            }

            current = if leaf { None } else { node.child(child) };
            child = 0;
        }
    }
}

fn draw<W: Write>(out: &mut W, node: &Node, backlog: &[Backlog]) -> Result<()> {
    let depth = backlog.len();
    for i in 1..depth {
        let column = if i == depth - 1 {
            "+-------"
        } else if backlog[i - 1].offset.is_some() {
            "|"
        } else {
            " "
        };
        write!(out, "{:<8}", column)?;
    }

    write!(out, "{}", if node.is_leaf() { "leaf:" } else { "node:" })?;
    for i in 0..node.key_count() {
        write!(out, " {}", node.key(i))?;
    }
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Value;
    use crate::storage::node::NodeKind;
    use tempfile::tempdir;

    #[test]
    fn test_dump_empty_tree() {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        assert_eq!(tree.dump().unwrap(), "");
    }

    #[test]
    fn test_dump_two_levels() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        for key in 1..=7 {
            tree.put(key, key as Value).unwrap();
        }

        assert_eq!(
            tree.dump().unwrap(),
            "node: 4\n+-------leaf: 1 2 3\n+-------leaf: 4 5 6 7\n"
        );
    }

    /// Stack `height - 1` single-child internal nodes over one leaf.
    fn tower(tree: &BPlusTree, height: usize) {
        let mut leaf = tree.new_node(NodeKind::Leaf).unwrap();
        leaf.set_key(0, 42);
        leaf.set_value(0, 1);
        leaf.set_count(1);
        let mut below = leaf.offset();
        tree.flush(leaf).unwrap();

        for _ in 1..height {
            let mut node = tree.new_node(NodeKind::Internal).unwrap();
            node.set_child(0, below);
            node.set_count(1);
            below = node.offset();
            tree.flush(node).unwrap();
        }
        tree.set_root(below, height);
    }

    #[test]
    fn test_dump_deeper_than_ten_levels() {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        tower(&tree, 12);

        let text = tree.dump().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0], "node:");
        assert_eq!(lines[1], "+-------node:");
        assert_eq!(lines[11], format!("{}+-------leaf: 42", " ".repeat(8 * 10)));
        assert_eq!(tree.cache_peak(), 1);
    }

    #[test]
    fn test_dump_rejects_path_below_level() {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        tower(&tree, 4);
        let root = tree.root();
        tree.set_root(root, 3);

        assert!(matches!(tree.dump(), Err(Error::InvariantViolation(_))));
        assert_eq!(tree.cache.in_use(), 0);
    }

    #[test]
    fn test_dump_three_levels_indents() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        for key in 0..40 {
            tree.put(key, 1 + key as Value).unwrap();
        }
        assert_eq!(tree.level(), 3);

        let text = tree.dump().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        let report = tree.verify().unwrap();
        assert_eq!(lines.len(), report.leaves + report.internal_nodes);
        assert!(lines[0].starts_with("node:"));
        assert!(lines[1].starts_with("+-------node:"));
        assert!(lines[2].starts_with("|       +-------leaf: 0 1 2"));
        // The last subtree has no sibling below it, so no rail.
        assert!(lines.last().unwrap().starts_with("        +-------leaf:"));
        assert!(tree.cache_peak() <= 5);
    }
}
