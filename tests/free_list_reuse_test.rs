//! Freed blocks are recycled before the file grows.

mod common;

use bplus_index::BPlusTree;
use common::{fill, index_path};

#[test]
fn test_delete_then_insert_does_not_grow_file() {
    let (path, _dir) = index_path();
    let mut tree = BPlusTree::open(&path, 128).unwrap();

    fill(&mut tree, 0..400);
    let high_water = tree.file_size();

    for key in 0..400 {
        tree.remove(key).unwrap();
    }
    assert!(tree.is_empty());
    assert_eq!(tree.free_blocks() as u64, high_water / 128);

    fill(&mut tree, 0..400);
    assert_eq!(tree.file_size(), high_water);
    tree.verify().unwrap();

    let stats = tree.io_stats();
    assert!(stats.blocks_reused > 0);
    assert_eq!(stats.blocks_allocated, high_water / 128);
}

#[test]
fn test_reuse_survives_reopen() {
    let (path, _dir) = index_path();
    {
        let mut tree = BPlusTree::open(&path, 128).unwrap();
        fill(&mut tree, 0..200);
        for key in 50..150 {
            tree.remove(key).unwrap();
        }
        tree.close().unwrap();
    }

    let mut tree = BPlusTree::open(&path, 128).unwrap();
    let size = tree.file_size();
    let free = tree.free_blocks();
    assert!(free > 0);

    tree.reset_io_stats();
    fill(&mut tree, 50..60);
    assert_eq!(tree.file_size(), size);
    assert_eq!(tree.io_stats().blocks_allocated, 0);
    assert!(tree.free_blocks() <= free);
    tree.verify().unwrap();
}
