//! bplus-index - A disk-backed B+ tree mapping `i32` keys to `i64` values.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          bplus-index                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Index Layer (index/)                      │   │
//! │  │   BPlusTree: search, insert/split, delete/merge, dump    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Node Cache (buffer/)                       │   │
//! │  │      NodeCache + Frame + NodeGuard (fixed budget)        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Storage Layer (storage/)                   │   │
//! │  │   BlockStore + FreeList + BootRecord + Node codec        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockOffset, FrameId, Error, config)
//! - [`buffer`] - Fixed pool of node buffers
//! - [`storage`] - Block I/O, node format, free list, and boot record
//! - [`index`] - The B+ tree itself
//!
//! # Quick Start
//! ```no_run
//! use bplus_index::BPlusTree;
//!
//! let mut tree = BPlusTree::open("my_index.db", 4096)?;
//! for key in 1..=100 {
//!     tree.put(key, key as i64 * 10)?;
//! }
//! assert_eq!(tree.get_range(10, 20)?, Some(200));
//! tree.remove(50)?;
//! print!("{}", tree.dump()?);
//! tree.close()?;
//! # Ok::<(), bplus_index::Error>(())
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{TreeConfig, DEFAULT_BLOCK_SIZE, EMPTY_VALUE};
pub use common::{BlockOffset, Error, Key, Result, Value};

pub use index::{BPlusTree, TreeReport};
pub use storage::IoStatsSnapshot;
