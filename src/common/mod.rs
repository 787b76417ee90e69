//! Common types and utilities shared across the index.
//!
//! - Configuration constants and [`TreeConfig`](config::TreeConfig)
//! - Error types
//! - Identifiers (BlockOffset, FrameId) and the key/value types

mod block_offset;
pub mod config;
pub mod error;
mod frame_id;

pub use block_offset::BlockOffset;
pub use error::{Error, Result};
pub use frame_id::FrameId;

/// Fixed-width signed key type.
pub type Key = i32;

/// 64-bit value stored against each key, typically a record locator.
pub type Value = i64;
