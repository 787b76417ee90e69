//! Disk-backed B+ tree.
//!
//! [`BPlusTree`] ties the storage and cache layers together:
//! - `search` - binary search, descent, point and range reads
//! - `insert` - leaf and internal insertion with split propagation
//! - `delete` - removal with borrow/merge and root collapse
//! - `dump` - depth-indented diagnostic traversal
//! - `verify` - structural invariant checker
//!
//! Nodes refer to each other by [`BlockOffset`] only. A node is touched
//! through a [`NodeGuard`] that lives no longer than the step that needs
//! it, so at most [`MIN_CACHE_FRAMES`](crate::common::config::MIN_CACHE_FRAMES)
//! buffers are live at any point.

mod delete;
mod dump;
mod insert;
mod search;
mod verify;

pub use verify::TreeReport;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::buffer::{NodeCache, NodeGuard};
use crate::common::config::{TreeConfig, MAX_PATH_LEN};
use crate::common::{BlockOffset, Error, Result};
use crate::storage::boot::{boot_path, BootRecord};
use crate::storage::node::{Node, NodeKind, NodeLayout};
use crate::storage::{BlockStore, FreeList, IoStatsSnapshot};

/// Deepest descent followed before a path is declared cyclic.
const MAX_DESCENT: usize = 64;

/// Root pointer and height, mutated only by structural changes.
#[derive(Debug, Clone, Copy, Default)]
struct TreeState {
    root: Option<BlockOffset>,
    /// Nodes on any root-to-leaf path; 0 when empty.
    level: usize,
}

/// An open B+ tree index.
///
/// # Thread Safety
/// Internals follow the cache's `&self` discipline, with the block store
/// and root state behind `Mutex`es so node guards can borrow the cache
/// while the store is driven. Mutating operations still take `&mut self`:
/// one writer per open file.
///
/// # Fatal errors
/// The first operation that fails with an [`Error::is_fatal`] error
/// poisons the handle: blocks it allocated but never wrote go back to the
/// free list, every later `get`/`put`/`remove`/`sync` returns
/// [`Error::Poisoned`], and neither `close` nor drop rewrites the boot
/// record. `verify` and `dump` stay available for diagnosis.
///
/// # Example
/// ```no_run
/// use bplus_index::BPlusTree;
///
/// let mut tree = BPlusTree::open("index.db", 4096)?;
/// tree.put(7, 700)?;
/// assert_eq!(tree.get(7)?, Some(700));
/// tree.close()?;
/// # Ok::<(), bplus_index::Error>(())
/// ```
pub struct BPlusTree {
    path: PathBuf,
    boot_path: PathBuf,
    layout: NodeLayout,
    store: Mutex<BlockStore>,
    cache: NodeCache,
    state: Mutex<TreeState>,
    /// Blocks allocated by the running operation and not yet written.
    pending: Mutex<Vec<BlockOffset>>,
    poisoned: AtomicBool,
    closed: bool,
}

impl BPlusTree {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the index at `path`, creating an empty tree of `block_size`
    /// bytes per node when no boot record exists.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        Self::open_with_config(path, TreeConfig::new().with_block_size(block_size))
    }

    /// Open with full configuration.
    ///
    /// An existing boot record's block size takes precedence over
    /// `config.block_size`.
    ///
    /// # Errors
    /// - `PathTooLong`, `InvalidBlockSize`, `InvalidCacheSize` before any
    ///   file is touched
    /// - `CorruptBoot` if the boot record cannot be decoded
    /// - any read error while locating the tree height
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: TreeConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= MAX_PATH_LEN {
            return Err(Error::PathTooLong {
                len,
                limit: MAX_PATH_LEN,
            });
        }
        config.validate()?;

        let boot_path = boot_path(&path);
        let (store, root) = match BootRecord::load(&boot_path)? {
            Some(boot) => {
                if boot.block_size != config.block_size {
                    warn!(
                        requested = config.block_size,
                        stored = boot.block_size,
                        "btree.open.block_size_override"
                    );
                }
                let layout = NodeLayout::new(boot.block_size)?;
                let free_list = FreeList::from_offsets(boot.free)?;
                let store = BlockStore::open(
                    &path,
                    layout,
                    boot.file_size,
                    free_list,
                    config.sync_writes,
                )?;
                (store, boot.root)
            }
            None => {
                let layout = NodeLayout::new(config.block_size)?;
                (BlockStore::create(&path, layout, config.sync_writes)?, None)
            }
        };

        let layout = *store.layout();
        let mut tree = Self {
            path,
            boot_path,
            layout,
            store: Mutex::new(store),
            cache: NodeCache::new(config.cache_frames, layout),
            state: Mutex::new(TreeState { root, level: 0 }),
            pending: Mutex::new(Vec::new()),
            poisoned: AtomicBool::new(false),
            closed: false,
        };
        match tree.measure_level() {
            Ok(level) => tree.state.get_mut().level = level,
            Err(err) => {
                // Leave the boot record as it was.
                tree.closed = true;
                return Err(err);
            }
        }

        info!(
            path = %tree.path.display(),
            block_size = layout.block_size(),
            max_order = layout.max_order(),
            max_entries = layout.max_entries(),
            level = tree.level(),
            file_size = tree.file_size(),
            free_blocks = tree.free_blocks(),
            "btree.open"
        );
        Ok(tree)
    }

    /// Persist the boot record and release the index.
    ///
    /// A poisoned handle is released without persisting and reports
    /// [`Error::Poisoned`].
    pub fn close(mut self) -> Result<()> {
        if self.is_poisoned() {
            self.closed = true;
            return Err(Error::Poisoned);
        }
        self.persist()?;
        self.closed = true;
        info!(path = %self.path.display(), "btree.close");
        Ok(())
    }

    /// Persist the boot record and fsync the index without closing.
    pub fn sync(&mut self) -> Result<()> {
        self.guarded(|tree| tree.persist())
    }

    /// Run one public operation.
    ///
    /// A poisoned handle refuses to start. On failure, blocks the operation
    /// allocated but never wrote are freed; a fatal failure poisons the
    /// handle.
    fn guarded<T>(&self, op: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        if self.is_poisoned() {
            return Err(Error::Poisoned);
        }
        let result = op(self);
        let pending = std::mem::take(&mut *self.pending.lock());

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                self.reclaim(pending);
                if err.is_fatal() {
                    self.poisoned.store(true, Ordering::Release);
                    warn!(path = %self.path.display(), error = %err, "btree.poisoned");
                }
                Err(err)
            }
        }
    }

    /// Return allocated-but-unwritten blocks to the free list.
    fn reclaim(&self, pending: Vec<BlockOffset>) {
        let mut store = self.store.lock();
        for offset in pending {
            if let Err(err) = store.free(offset) {
                warn!(%offset, error = %err, "btree.reclaim_failed");
            }
        }
    }

    fn persist(&self) -> Result<()> {
        let record = {
            let mut store = self.store.lock();
            store.sync()?;
            BootRecord {
                root: self.state.lock().root,
                block_size: self.layout.block_size(),
                file_size: store.file_size(),
                free: store.free_list().iter().collect(),
            }
        };
        record.save(&self.boot_path)?;
        debug!(
            root = ?record.root,
            file_size = record.file_size,
            free_blocks = record.free.len(),
            "btree.persist"
        );
        Ok(())
    }

    /// Height from the leftmost root-to-leaf path.
    fn measure_level(&self) -> Result<usize> {
        let Some(root) = self.root() else {
            return Ok(0);
        };

        let mut offset = root;
        let mut expected_parent = None;
        for level in 1..=MAX_DESCENT {
            let node = self.fetch(offset)?;
            if node.parent() != expected_parent {
                return Err(Error::corrupt(offset, "parent link does not match descent"));
            }
            if node.is_leaf() {
                return Ok(level);
            }
            expected_parent = Some(offset);
            offset = node
                .child(0)
                .ok_or_else(|| Error::corrupt(offset, "internal node without children"))?;
        }
        Err(Error::corrupt(root, "descent did not reach a leaf"))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Offset of the root node, `None` when the tree is empty.
    pub fn root(&self) -> Option<BlockOffset> {
        self.state.lock().root
    }

    /// Tree height: 0 when empty, 1 for a lone leaf.
    pub fn level(&self) -> usize {
        self.state.lock().level
    }

    pub fn is_empty(&self) -> bool {
        self.root().is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// High-water mark of the index file.
    pub fn file_size(&self) -> u64 {
        self.store.lock().file_size()
    }

    /// Number of blocks waiting on the free list.
    pub fn free_blocks(&self) -> usize {
        self.store.lock().free_list().len()
    }

    pub fn block_size(&self) -> usize {
        self.layout.block_size()
    }

    pub fn max_order(&self) -> usize {
        self.layout.max_order()
    }

    pub fn max_entries(&self) -> usize {
        self.layout.max_entries()
    }

    pub fn io_stats(&self) -> IoStatsSnapshot {
        self.store.lock().stats().snapshot()
    }

    /// Most node buffers live at once since open.
    pub fn cache_peak(&self) -> usize {
        self.cache.peak_in_use()
    }

    /// Zero the I/O counters.
    pub fn reset_io_stats(&self) {
        self.store.lock().stats().reset();
    }

    /// Whether a fatal error has disabled this handle.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn set_root(&self, root: Option<BlockOffset>, level: usize) {
        let mut state = self.state.lock();
        state.root = root;
        state.level = level;
    }

    // ========================================================================
    // Node plumbing
    // ========================================================================

    /// Read the node at `offset` into a fresh buffer.
    fn fetch(&self, offset: BlockOffset) -> Result<NodeGuard<'_>> {
        let mut guard = self.cache.acquire()?;
        guard.bind(offset)?;
        self.store.lock().read(offset, &mut guard)?;
        Ok(guard)
    }

    /// `fetch` for an optional link; an absent link is no node.
    fn fetch_link(&self, offset: Option<BlockOffset>) -> Result<Option<NodeGuard<'_>>> {
        offset.map(|offset| self.fetch(offset)).transpose()
    }

    /// Write a node back and release its buffer.
    fn flush(&self, mut guard: NodeGuard<'_>) -> Result<()> {
        self.store.lock().write(&mut guard)?;
        if let Some(offset) = guard.offset() {
            self.pending.lock().retain(|&pending| pending != offset);
        }
        Ok(())
    }

    /// Allocate a block and an empty buffer for a new node.
    fn new_node(&self, kind: NodeKind) -> Result<NodeGuard<'_>> {
        let mut guard = self.cache.acquire()?;
        guard.init(kind);
        let offset = self.store.lock().allocate();
        self.pending.lock().push(offset);
        guard.bind(offset)?;
        guard.set_offset(Some(offset));
        Ok(guard)
    }

    /// Unlink `node` from its level and return its block to the free list.
    ///
    /// `left` and `right` are the node's current neighbours if the caller
    /// already holds them; missing neighbours are fetched here.
    fn delete_node(
        &self,
        node: NodeGuard<'_>,
        left: Option<NodeGuard<'_>>,
        right: Option<NodeGuard<'_>>,
    ) -> Result<()> {
        let offset = node
            .offset()
            .ok_or_else(|| Error::corrupt(BlockOffset::INVALID, "delete of an unplaced node"))?;
        let (prev, next) = (node.prev(), node.next());
        drop(node);

        let left = match left {
            Some(guard) => Some(guard),
            None => self.fetch_link(prev)?,
        };
        if let Some(mut left) = left {
            left.set_next(next);
            self.flush(left)?;
        }
        let right = match right {
            Some(guard) => Some(guard),
            None => self.fetch_link(next)?,
        };
        if let Some(mut right) = right {
            right.set_prev(prev);
            self.flush(right)?;
        }

        self.store.lock().free(offset)
    }

    /// Place `child` in slot `index` of `parent`, then write the child.
    fn attach_child(&self, parent: &mut Node, index: usize, mut child: NodeGuard<'_>) -> Result<()> {
        parent.set_child(index, child.offset());
        child.set_parent(parent.offset());
        self.flush(child)
    }

    /// Point the child at `offset` to a new parent.
    fn reparent(&self, offset: BlockOffset, parent: Option<BlockOffset>) -> Result<()> {
        let mut child = self.fetch(offset)?;
        child.set_parent(parent);
        self.flush(child)
    }

    /// Reparent every child in `slots` of `node` to `node`.
    fn reparent_children(&self, node: &Node, slots: std::ops::Range<usize>) -> Result<()> {
        for slot in slots {
            let child = node
                .child(slot)
                .ok_or_else(|| Error::corrupt(BlockOffset::INVALID, "empty child slot"))?;
            self.reparent(child, node.offset())?;
        }
        Ok(())
    }

    /// Insert `new` into the level chain immediately left of `node`.
    fn link_left(&self, new: &mut Node, node: &mut Node) -> Result<()> {
        new.set_parent(node.parent());
        new.set_prev(node.prev());
        new.set_next(node.offset());
        if let Some(mut prev) = self.fetch_link(node.prev())? {
            prev.set_next(new.offset());
            self.flush(prev)?;
        }
        node.set_prev(new.offset());
        Ok(())
    }

    /// Insert `new` into the level chain immediately right of `node`.
    fn link_right(&self, node: &mut Node, new: &mut Node) -> Result<()> {
        new.set_parent(node.parent());
        new.set_next(node.next());
        new.set_prev(node.offset());
        if let Some(mut next) = self.fetch_link(node.next())? {
            next.set_prev(new.offset());
            self.flush(next)?;
        }
        node.set_next(new.offset());
        Ok(())
    }
}

impl Drop for BPlusTree {
    fn drop(&mut self) {
        if self.closed || self.is_poisoned() {
            return;
        }
        if let Err(err) = self.persist() {
            warn!(path = %self.path.display(), error = %err, "btree.drop.persist_failed");
        }
    }
}

impl std::fmt::Debug for BPlusTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("path", &self.path)
            .field("block_size", &self.layout.block_size())
            .field("root", &self.root())
            .field("level", &self.level())
            .field("cache_frames", &self.cache.capacity())
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_fresh_tree() {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();

        assert!(tree.is_empty());
        assert_eq!(tree.level(), 0);
        assert_eq!(tree.file_size(), 0);
        assert_eq!(tree.max_order(), 6);
        assert_eq!(tree.max_entries(), 6);
    }

    #[test]
    fn test_open_rejects_bad_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");

        assert!(matches!(
            BPlusTree::open(&path, 1000),
            Err(Error::InvalidBlockSize { size: 1000, .. })
        ));
        assert!(matches!(
            BPlusTree::open(&path, 64),
            Err(Error::InvalidBlockSize { size: 64, .. })
        ));
        assert!(matches!(
            BPlusTree::open_with_config(&path, TreeConfig::new().with_cache_frames(3)),
            Err(Error::InvalidCacheSize(3))
        ));
        // Nothing was created.
        assert!(!path.exists());
    }

    #[test]
    fn test_open_rejects_long_path() {
        let long = "x".repeat(MAX_PATH_LEN);
        assert!(matches!(
            BPlusTree::open(&long, 4096),
            Err(Error::PathTooLong { .. })
        ));
    }

    #[test]
    fn test_close_writes_boot_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");

        let tree = BPlusTree::open(&path, 128).unwrap();
        tree.close().unwrap();

        let boot = BootRecord::load(&boot_path(&path)).unwrap().unwrap();
        assert_eq!(boot, BootRecord::empty(128));
    }

    #[test]
    fn test_drop_persists_boot_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");
        {
            let mut tree = BPlusTree::open(&path, 128).unwrap();
            tree.put(1, 10).unwrap();
        }
        let boot = BootRecord::load(&boot_path(&path)).unwrap().unwrap();
        assert_eq!(boot.root, Some(BlockOffset::new(0)));
        assert_eq!(boot.file_size, 128);
    }

    #[test]
    fn test_boot_block_size_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");

        BPlusTree::open(&path, 256).unwrap().close().unwrap();
        let tree = BPlusTree::open(&path, 4096).unwrap();
        assert_eq!(tree.block_size(), 256);
    }

    #[test]
    fn test_fatal_error_poisons_handle() {
        use std::fs::{self, OpenOptions};
        use std::io::{Seek, SeekFrom, Write};

        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");
        let mut tree = BPlusTree::open(&path, 128).unwrap();

        // Leaves [10 11 12 13 20 30] at 0x0 and [40 50 60 70] at 0x80.
        for key in [10, 20, 30, 40, 50, 60, 70, 11, 12, 13] {
            tree.put(key, key as i64).unwrap();
        }
        tree.sync().unwrap();
        let boot_before = fs::read_to_string(boot_path(&path)).unwrap();
        assert_eq!(tree.file_size(), 384);

        // Damage the right neighbour so the next split of 0x0 fails after
        // allocating its new block.
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(0x80 + 48)).unwrap();
        file.write_all(&[0xFF]).unwrap();
        drop(file);

        let err = tree.put(35, 35).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch(offset) if offset == BlockOffset::new(0x80)));
        assert!(err.is_fatal());
        assert!(tree.is_poisoned());

        // The block allocated for the split went back to the free list.
        assert_eq!(tree.file_size(), 512);
        assert_eq!(tree.free_blocks(), 1);
        assert_eq!(tree.cache.in_use(), 0);

        assert!(matches!(tree.put(1, 1), Err(Error::Poisoned)));
        assert!(matches!(tree.remove(10), Err(Error::Poisoned)));
        assert!(matches!(tree.get(10), Err(Error::Poisoned)));
        assert!(matches!(tree.range(0, 100), Err(Error::Poisoned)));
        assert!(matches!(tree.sync(), Err(Error::Poisoned)));

        // Dropping a poisoned handle leaves the boot record alone.
        drop(tree);
        assert_eq!(fs::read_to_string(boot_path(&path)).unwrap(), boot_before);
    }

    #[test]
    fn test_close_of_poisoned_handle_skips_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");
        let mut tree = BPlusTree::open(&path, 128).unwrap();
        tree.put(1, 10).unwrap();
        tree.poisoned.store(true, Ordering::Release);

        assert!(matches!(tree.close(), Err(Error::Poisoned)));
        assert!(BootRecord::load(&boot_path(&path)).unwrap().is_none());
    }

    #[test]
    fn test_logical_error_does_not_poison() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();
        tree.put(1, 10).unwrap();

        assert!(matches!(tree.put(1, 11), Err(Error::DuplicateKey(1))));
        assert!(matches!(tree.remove(2), Err(Error::KeyNotFound(2))));
        assert!(!tree.is_poisoned());
        assert_eq!(tree.get(1).unwrap(), Some(10));
    }

    #[test]
    fn test_delete_node_relinks_neighbours() {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::open(dir.path().join("t.idx"), 128).unwrap();

        // Three leaves chained a <-> b <-> c.
        let mut a = tree.new_node(NodeKind::Leaf).unwrap();
        let mut b = tree.new_node(NodeKind::Leaf).unwrap();
        let mut c = tree.new_node(NodeKind::Leaf).unwrap();
        let (ao, bo, co) = (a.offset(), b.offset(), c.offset());
        a.set_next(bo);
        b.set_prev(ao);
        b.set_next(co);
        c.set_prev(bo);
        tree.flush(a).unwrap();
        tree.flush(c).unwrap();

        tree.delete_node(b, None, None).unwrap();

        let a = tree.fetch(ao.unwrap()).unwrap();
        assert_eq!(a.next(), co);
        drop(a);
        let c = tree.fetch(co.unwrap()).unwrap();
        assert_eq!(c.prev(), ao);
        drop(c);
        assert_eq!(tree.free_blocks(), 1);
        assert_eq!(tree.cache.in_use(), 0);
    }
}
