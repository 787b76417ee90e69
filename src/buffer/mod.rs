//! Node cache.
//!
//! A fixed pool of node buffers used as scratch space while a tree
//! operation is in flight. Buffers are not retained across operations.
//!
//! # Components
//! - [`NodeCache`] - The bounded buffer pool
//! - [`Frame`] - A slot holding one node buffer
//! - [`NodeGuard`] - RAII guard for node access

mod frame;
mod node_cache;
mod node_guard;

pub use frame::Frame;
pub use node_cache::NodeCache;
pub use node_guard::NodeGuard;
