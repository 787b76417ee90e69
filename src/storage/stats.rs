//! Block store I/O statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the block store.
///
/// All fields are atomic so they can be bumped through `&self`. Relaxed
/// ordering is enough: the counters are independent and only read for
/// reporting.
#[derive(Debug, Default)]
pub struct IoStats {
    /// Blocks read from the index file.
    pub blocks_read: AtomicU64,

    /// Blocks written to the index file.
    pub blocks_written: AtomicU64,

    /// Allocations that extended the file.
    pub blocks_allocated: AtomicU64,

    /// Allocations served from the free list.
    pub blocks_reused: AtomicU64,

    /// Blocks returned to the free list.
    pub blocks_freed: AtomicU64,
}

impl IoStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> IoStatsSnapshot {
        IoStatsSnapshot {
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
            blocks_allocated: self.blocks_allocated.load(Ordering::Relaxed),
            blocks_reused: self.blocks_reused.load(Ordering::Relaxed),
            blocks_freed: self.blocks_freed.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.blocks_read.store(0, Ordering::Relaxed);
        self.blocks_written.store(0, Ordering::Relaxed);
        self.blocks_allocated.store(0, Ordering::Relaxed);
        self.blocks_reused.store(0, Ordering::Relaxed);
        self.blocks_freed.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time copy of [`IoStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStatsSnapshot {
    pub blocks_read: u64,
    pub blocks_written: u64,
    pub blocks_allocated: u64,
    pub blocks_reused: u64,
    pub blocks_freed: u64,
}

impl fmt::Display for IoStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read: {}, written: {}, allocated: {}, reused: {}, freed: {}",
            self.blocks_read,
            self.blocks_written,
            self.blocks_allocated,
            self.blocks_reused,
            self.blocks_freed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot_and_reset() {
        let stats = IoStats::new();
        IoStats::bump(&stats.blocks_read);
        IoStats::bump(&stats.blocks_read);
        IoStats::bump(&stats.blocks_freed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.blocks_read, 2);
        assert_eq!(snapshot.blocks_freed, 1);
        assert_eq!(snapshot.blocks_written, 0);

        stats.reset();
        assert_eq!(stats.snapshot(), IoStatsSnapshot::default());
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = IoStatsSnapshot {
            blocks_read: 3,
            blocks_written: 4,
            blocks_allocated: 2,
            blocks_reused: 1,
            blocks_freed: 0,
        };
        assert_eq!(
            snapshot.to_string(),
            "read: 3, written: 4, allocated: 2, reused: 1, freed: 0"
        );
    }
}
