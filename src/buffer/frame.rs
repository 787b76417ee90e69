//! Frame - a slot in the node cache.
//!
//! A [`Frame`] holds one [`Node`] buffer plus a flag recording whether a
//! guard currently owns it.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::storage::node::{Node, NodeLayout};

/// A frame in the node cache.
///
/// Frames are allocated once when the cache is built and reused for the
/// life of the tree. The node buffer sits behind a `Mutex` so a guard can
/// hold exclusive access while only borrowing the cache immutably.
pub struct Frame {
    /// The node buffer.
    node: Mutex<Node>,

    /// Whether a guard currently owns this frame.
    in_use: AtomicBool,
}

impl Frame {
    /// Create a new idle frame sized for `layout`.
    pub fn new(layout: NodeLayout) -> Self {
        Self {
            node: Mutex::new(Node::new(layout)),
            in_use: AtomicBool::new(false),
        }
    }

    /// Lock the node buffer.
    #[inline]
    pub fn node(&self) -> MutexGuard<'_, Node> {
        self.node.lock()
    }

    /// Mark the frame as owned.
    ///
    /// # Panics
    /// Panics if the frame is already owned.
    #[inline]
    pub fn claim(&self) {
        let was = self.in_use.swap(true, Ordering::Relaxed);
        assert!(!was, "frame claimed twice");
    }

    /// Mark the frame as idle.
    ///
    /// # Panics
    /// Panics if the frame is not owned.
    #[inline]
    pub fn release(&self) {
        let was = self.in_use.swap(false, Ordering::Relaxed);
        assert!(was, "frame released while idle");
    }

    #[cfg(test)]
    pub(crate) fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(NodeLayout::new(128).unwrap())
    }

    #[test]
    fn test_frame_new() {
        let frame = frame();
        assert!(!frame.is_in_use());
        assert_eq!(frame.node().as_slice().len(), 128);
    }

    #[test]
    fn test_frame_claim_release() {
        let frame = frame();
        frame.claim();
        assert!(frame.is_in_use());
        frame.release();
        assert!(!frame.is_in_use());
    }

    #[test]
    #[should_panic(expected = "frame claimed twice")]
    fn test_frame_double_claim() {
        let frame = frame();
        frame.claim();
        frame.claim();
    }

    #[test]
    #[should_panic(expected = "frame released while idle")]
    fn test_frame_release_underflow() {
        frame().release();
    }

    #[test]
    fn test_frame_node_access() {
        let frame = frame();
        frame.node().as_mut_slice()[60] = 0xAB;
        assert_eq!(frame.node().as_slice()[60], 0xAB);
    }
}
