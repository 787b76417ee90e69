//! Node codec.
//!
//! This module contains:
//! - [`Node`] - A block-sized buffer with typed field accessors
//! - [`NodeHeader`] - Metadata at the start of every block
//! - [`NodeKind`] - Leaf or internal discriminator
//! - [`NodeLayout`] - Capacities and slot offsets derived from the block size

mod header;
mod layout;
#[allow(clippy::module_inception)]
mod node;

pub use header::{NodeHeader, NodeKind};
pub use layout::NodeLayout;
pub use node::Node;
