//! Block Store - file I/O for node blocks.
//!
//! The [`BlockStore`] handles all direct file operations:
//! - Allocating block offsets, reusing freed blocks first
//! - Reading and writing whole node blocks
//! - Returning deleted blocks to the free list

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::trace;

use crate::common::{BlockOffset, Error, Result};
use crate::storage::node::{Node, NodeLayout};
use crate::storage::{FreeList, IoStats};

/// Owns the index file and its allocation state.
///
/// # File Layout
/// The index is a flat run of fixed-size blocks; a node's offset is the
/// byte position of its block:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │  ...    │ Block N │
/// └─────────┴─────────┴─────────┴─────────┘
/// Offset:  0     bs      ...      N×bs
/// ```
/// `file_size` is the high-water mark: the offset the next fresh block
/// will receive when the free list is empty.
///
/// # Durability
/// Writes are only followed by `fsync()` when `sync_writes` is set; `sync`
/// always flushes.
pub struct BlockStore {
    file: File,
    layout: NodeLayout,
    file_size: u64,
    free_list: FreeList,
    stats: IoStats,
    sync_writes: bool,
}

impl BlockStore {
    /// Create or truncate the index file for a fresh tree.
    pub fn create<P: AsRef<Path>>(path: P, layout: NodeLayout, sync_writes: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            layout,
            file_size: 0,
            free_list: FreeList::new(),
            stats: IoStats::new(),
            sync_writes,
        })
    }

    /// Open an existing index file with allocation state from its boot record.
    pub fn open<P: AsRef<Path>>(
        path: P,
        layout: NodeLayout,
        file_size: u64,
        free_list: FreeList,
        sync_writes: bool,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            layout,
            file_size,
            free_list,
            stats: IoStats::new(),
            sync_writes,
        })
    }

    /// Assign an offset to a new node.
    ///
    /// The head of the free list wins; otherwise the file grows by one
    /// block. Nothing is written until the node itself is.
    pub fn allocate(&mut self) -> BlockOffset {
        if let Some(offset) = self.free_list.pop() {
            IoStats::bump(&self.stats.blocks_reused);
            trace!(%offset, reused = true, "store.allocate");
            return offset;
        }

        let offset = BlockOffset::new(self.file_size);
        self.file_size += self.layout.block_size() as u64;
        IoStats::bump(&self.stats.blocks_allocated);
        trace!(%offset, reused = false, "store.allocate");
        offset
    }

    /// Read the block at `offset` into `node`.
    ///
    /// # Errors
    /// - `ShortRead` if the file ends inside the block
    /// - `ChecksumMismatch` if the stored checksum is wrong
    /// - `CorruptNode` if the block is free, misplaced, or malformed
    pub fn read(&mut self, offset: BlockOffset, node: &mut Node) -> Result<()> {
        self.check_bounds(offset)?;
        if self.free_list.contains(offset) {
            return Err(Error::corrupt(offset, "read of a free block"));
        }

        self.file.seek(SeekFrom::Start(offset.0))?;
        let expected = self.layout.block_size();
        let actual = read_full(&mut self.file, node.as_mut_slice())?;
        if actual < expected {
            return Err(Error::ShortRead {
                offset,
                expected,
                actual,
            });
        }
        IoStats::bump(&self.stats.blocks_read);

        if !node.verify_checksum() {
            return Err(Error::ChecksumMismatch(offset));
        }
        if node.offset() != Some(offset) {
            return Err(Error::corrupt(offset, "stored offset does not match location"));
        }
        if node.kind().is_none() {
            return Err(Error::corrupt(offset, "unknown node kind"));
        }
        if node.count() > node.capacity() {
            return Err(Error::corrupt(offset, "count exceeds capacity"));
        }

        trace!(%offset, count = node.count(), "store.read");
        Ok(())
    }

    /// Stamp the checksum and write exactly one block at `node.offset()`.
    pub fn write(&mut self, node: &mut Node) -> Result<()> {
        let offset = node
            .offset()
            .ok_or_else(|| Error::corrupt(BlockOffset::INVALID, "write of an unplaced node"))?;
        self.check_bounds(offset)?;

        node.update_checksum();
        self.file.seek(SeekFrom::Start(offset.0))?;
        self.file.write_all(node.as_slice())?;
        if self.sync_writes {
            self.file.sync_all()?;
        }
        IoStats::bump(&self.stats.blocks_written);

        trace!(%offset, count = node.count(), "store.write");
        Ok(())
    }

    /// Return a block to the free list.
    pub fn free(&mut self, offset: BlockOffset) -> Result<()> {
        self.check_bounds(offset)?;
        self.free_list.push(offset)?;
        IoStats::bump(&self.stats.blocks_freed);
        trace!(%offset, free_blocks = self.free_list.len(), "store.free");
        Ok(())
    }

    /// Flush file contents and metadata to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    #[inline]
    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    /// High-water mark of the index file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    #[inline]
    pub fn free_list(&self) -> &FreeList {
        &self.free_list
    }

    #[inline]
    pub fn stats(&self) -> &IoStats {
        &self.stats
    }

    fn check_bounds(&self, offset: BlockOffset) -> Result<()> {
        if !offset.is_aligned(self.layout.block_size()) || offset.0 >= self.file_size {
            return Err(Error::corrupt(offset, "offset outside the index file"));
        }
        Ok(())
    }
}

/// Read until `buf` is full or the file ends, returning the bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
