//! Storage layer - disk I/O and block formats.
//!
//! This module handles persistent storage:
//! - [`BlockStore`] - Block allocation and file I/O
//! - [`node`] - Node block layout and codec
//! - [`FreeList`] - Reclaimed blocks awaiting reuse
//! - [`BootRecord`] - Root, geometry, and free list persisted across restarts
//! - [`IoStats`] - I/O counters

mod block_store;
pub mod boot;
mod free_list;
pub mod node;
mod stats;

pub use block_store::BlockStore;
pub use boot::BootRecord;
pub use free_list::FreeList;
pub use stats::{IoStats, IoStatsSnapshot};
