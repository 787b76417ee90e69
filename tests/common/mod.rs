//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use bplus_index::{BPlusTree, Key, Value};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fresh index file in its own temporary directory.
pub fn index_path() -> (PathBuf, TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    (dir.path().join("test.idx"), dir)
}

/// Value stored for `key` throughout the tests; never `EMPTY_VALUE`.
pub fn value_of(key: Key) -> Value {
    key as Value * 100 + 1
}

pub fn fill(tree: &mut BPlusTree, keys: impl IntoIterator<Item = Key>) {
    for key in keys {
        tree.put(key, value_of(key)).unwrap();
    }
}
