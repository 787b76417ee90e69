//! RAII guard for node buffer access.
//!
//! A [`NodeGuard`] owns one frame of the [`NodeCache`] and derefs to its
//! [`Node`]. Dropping the guard unbinds its block and returns the frame.

use std::ops::{Deref, DerefMut};

use parking_lot::MutexGuard;

use crate::common::{BlockOffset, FrameId, Result};
use crate::storage::node::Node;

use super::node_cache::NodeCache;

/// Exclusive access to a node buffer.
///
/// # Example
/// ```ignore
/// let mut guard = cache.acquire()?;
/// guard.bind(offset)?;
/// store.read(offset, &mut guard)?;
/// // guard drops here, frame returned to the cache
/// ```
pub struct NodeGuard<'a> {
    /// Reference back to the cache for release on drop.
    cache: &'a NodeCache,
    /// Frame holding this node.
    frame_id: FrameId,
    /// Block this buffer stands for, if any.
    bound: Option<BlockOffset>,
    /// Lock guard providing access to the node data.
    lock: MutexGuard<'a, Node>,
}

impl<'a> NodeGuard<'a> {
    /// Called by `NodeCache::acquire()`.
    pub(crate) fn new(cache: &'a NodeCache, frame_id: FrameId, lock: MutexGuard<'a, Node>) -> Self {
        Self {
            cache,
            frame_id,
            bound: None,
            lock,
        }
    }

    /// Record that this buffer now holds the block at `offset`.
    ///
    /// # Errors
    /// `AliasedBlock` if another live guard is bound to the same block.
    pub fn bind(&mut self, offset: BlockOffset) -> Result<()> {
        if self.bound == Some(offset) {
            return Ok(());
        }
        self.cache.register(offset, self.frame_id)?;
        if let Some(previous) = self.bound.replace(offset) {
            self.cache.unregister(previous);
        }
        Ok(())
    }

    /// Block this buffer is bound to.
    #[inline]
    pub fn bound(&self) -> Option<BlockOffset> {
        self.bound
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for NodeGuard<'_> {
    type Target = Node;

    #[inline]
    fn deref(&self) -> &Node {
        &self.lock
    }
}

impl DerefMut for NodeGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Node {
        &mut self.lock
    }
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        if let Some(offset) = self.bound.take() {
            self.cache.unregister(offset);
        }
        self.cache.release(self.frame_id);
    }
}
