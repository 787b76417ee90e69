//! FIFO list of reclaimed block offsets.

use std::collections::{HashSet, VecDeque};

use crate::common::{BlockOffset, Error, Result};

/// Reclaimed blocks available for reuse, oldest first.
///
/// A queue keeps reuse order stable across restarts and a set gives O(1)
/// membership checks so a block is never handed out twice.
#[derive(Debug, Default)]
pub struct FreeList {
    /// Offsets in release order (front = oldest).
    queue: VecDeque<BlockOffset>,

    /// Set for O(1) membership check.
    members: HashSet<BlockOffset>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a list from persisted offsets, preserving their order.
    ///
    /// # Errors
    /// `CorruptBoot` if an offset appears twice.
    pub fn from_offsets(offsets: impl IntoIterator<Item = BlockOffset>) -> Result<Self> {
        let mut list = Self::new();
        for offset in offsets {
            if !list.members.insert(offset) {
                return Err(Error::CorruptBoot(format!(
                    "free list contains {} twice",
                    offset
                )));
            }
            list.queue.push_back(offset);
        }
        Ok(list)
    }

    /// Append a released block.
    ///
    /// # Errors
    /// `CorruptNode` if the block is already free.
    pub fn push(&mut self, offset: BlockOffset) -> Result<()> {
        if !self.members.insert(offset) {
            return Err(Error::corrupt(offset, "block freed twice"));
        }
        self.queue.push_back(offset);
        Ok(())
    }

    /// Take the oldest free block.
    pub fn pop(&mut self) -> Option<BlockOffset> {
        let offset = self.queue.pop_front()?;
        self.members.remove(&offset);
        Some(offset)
    }

    pub fn contains(&self, offset: BlockOffset) -> bool {
        self.members.contains(&offset)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Offsets in reuse order.
    pub fn iter(&self) -> impl Iterator<Item = BlockOffset> + '_ {
        self.queue.iter().copied()
    }
}
