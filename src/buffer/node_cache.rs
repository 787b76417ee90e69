//! Node Cache - the bounded pool of node buffers.
//!
//! The [`NodeCache`] provides:
//! - A fixed number of node-sized frames allocated up front
//! - RAII guards that return their frame on drop
//! - A resident table guaranteeing no two buffers alias one block

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::buffer::{Frame, NodeGuard};
use crate::common::{BlockOffset, Error, FrameId, Result};
use crate::storage::node::NodeLayout;

/// Fixed pool of scratch buffers for in-flight tree operations.
///
/// # Architecture
/// ```text
/// ┌───────────────────────────────────────────────────────────┐
/// │                        NodeCache                          │
/// │  ┌──────────────┐  ┌──────────────────────────────────┐   │
/// │  │  resident    │  │        frames: Vec<Frame>        │   │
/// │  │Offset → Fid  │─▶│  [Frame0] [Frame1] [Frame2] ...  │   │
/// │  └──────────────┘  └──────────────────────────────────┘   │
/// │  ┌──────────────┐  ┌──────────────┐                       │
/// │  │ free_frames  │  │ in_use/peak  │                       │
/// │  │ Vec<FrameId> │  │   atomics    │                       │
/// │  └──────────────┘  └──────────────┘                       │
/// └───────────────────────────────────────────────────────────┘
/// ```
///
/// Nothing is retained between operations: a buffer holds a block only
/// while its guard lives. Running out of frames means an operation needed
/// more live nodes than the cache was sized for, which is a bug, so
/// [`acquire`](Self::acquire) fails with `CacheExhausted` instead of
/// waiting or evicting.
pub struct NodeCache {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Stack of idle frame IDs (LIFO).
    free_frames: Mutex<Vec<FrameId>>,

    /// Blocks currently held by a guard.
    resident: Mutex<HashMap<BlockOffset, FrameId>>,

    /// Guards currently alive.
    in_use: AtomicUsize,

    /// Highest `in_use` observed.
    peak_in_use: AtomicUsize,
}

impl NodeCache {
    /// Create a cache of `capacity` frames sized for `layout`.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, layout: NodeLayout) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        let frames: Vec<Frame> = (0..capacity).map(|_| Frame::new(layout)).collect();

        // Reverse so frame 0 is handed out first.
        let free_frames: Vec<FrameId> = (0..capacity).rev().map(FrameId::new).collect();

        Self {
            frames,
            free_frames: Mutex::new(free_frames),
            resident: Mutex::new(HashMap::with_capacity(capacity)),
            in_use: AtomicUsize::new(0),
            peak_in_use: AtomicUsize::new(0),
        }
    }

    /// Take an idle buffer.
    ///
    /// The buffer's contents are whatever the previous owner left; callers
    /// either read a block into it or `init` it.
    ///
    /// # Errors
    /// `CacheExhausted` if every frame is owned.
    pub fn acquire(&self) -> Result<NodeGuard<'_>> {
        let frame_id = self
            .free_frames
            .lock()
            .pop()
            .ok_or_else(|| Error::CacheExhausted(self.capacity()))?;

        let frame = &self.frames[frame_id.0];
        frame.claim();

        let in_use = self.in_use.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_use.fetch_max(in_use, Ordering::Relaxed);
        trace!(frame = %frame_id, in_use, "cache.acquire");

        Ok(NodeGuard::new(self, frame_id, frame.node()))
    }

    /// Number of frames.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Guards currently alive.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Most guards ever alive at once since the last reset.
    #[inline]
    pub fn peak_in_use(&self) -> usize {
        self.peak_in_use.load(Ordering::Relaxed)
    }

    pub fn reset_peak(&self) {
        self.peak_in_use.store(self.in_use(), Ordering::Relaxed);
    }

    /// Whether a live guard is bound to `offset`.
    #[cfg(test)]
    pub(crate) fn is_resident(&self, offset: BlockOffset) -> bool {
        self.resident.lock().contains_key(&offset)
    }

    // ========================================================================
    // Guard callbacks
    // ========================================================================

    pub(crate) fn register(&self, offset: BlockOffset, frame_id: FrameId) -> Result<()> {
        let mut resident = self.resident.lock();
        if resident.contains_key(&offset) {
            return Err(Error::AliasedBlock(offset));
        }
        resident.insert(offset, frame_id);
        Ok(())
    }

    pub(crate) fn unregister(&self, offset: BlockOffset) {
        self.resident.lock().remove(&offset);
    }

    pub(crate) fn release(&self, frame_id: FrameId) {
        self.frames[frame_id.0].release();
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        self.free_frames.lock().push(frame_id);
    }
}
