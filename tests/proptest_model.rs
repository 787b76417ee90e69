//! Random operation sequences checked against an in-memory model.

mod common;

use std::collections::BTreeMap;

use bplus_index::{BPlusTree, Error, Key, Value};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Put(Key, Value),
    Remove(Key),
    Get(Key),
    Range(Key, Key),
}

fn arb_op() -> impl Strategy<Value = Op> {
    // A narrow key space keeps duplicates and misses frequent.
    let key = -50..250i32;
    prop_oneof![
        4 => (key.clone(), 1..i64::MAX).prop_map(|(k, v)| Op::Put(k, v)),
        3 => key.clone().prop_map(Op::Remove),
        1 => key.clone().prop_map(Op::Get),
        1 => (key.clone(), key).prop_map(|(a, b)| Op::Range(a, b)),
    ]
}

fn model_range(model: &BTreeMap<Key, Value>, a: Key, b: Key) -> Vec<(Key, Value)> {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    model.range(low..=high).map(|(&k, &v)| (k, v)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_tree_matches_model(ops in prop::collection::vec(arb_op(), 1..400)) {
        let (path, _dir) = common::index_path();
        let mut tree = BPlusTree::open(&path, 128).unwrap();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Op::Put(key, value) => {
                    let result = tree.put(key, value);
                    if model.contains_key(&key) {
                        prop_assert!(matches!(result, Err(Error::DuplicateKey(k)) if k == key));
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(key, value);
                    }
                }
                Op::Remove(key) => {
                    let result = tree.remove(key);
                    if model.remove(&key).is_some() {
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert!(matches!(result, Err(Error::KeyNotFound(k)) if k == key));
                    }
                }
                Op::Get(key) => {
                    prop_assert_eq!(tree.get(key).unwrap(), model.get(&key).copied());
                }
                Op::Range(a, b) => {
                    let expected = model_range(&model, a, b);
                    prop_assert_eq!(
                        tree.get_range(a, b).unwrap(),
                        expected.last().map(|&(_, v)| v)
                    );
                    prop_assert_eq!(tree.range(a, b).unwrap(), expected);
                }
            }
        }

        let report = tree.verify().unwrap();
        prop_assert_eq!(report.entries, model.len());
        prop_assert!(tree.cache_peak() <= 5);
    }

    #[test]
    fn prop_reopen_matches_model(keys in prop::collection::btree_set(-1000..1000i32, 0..300)) {
        let (path, _dir) = common::index_path();
        {
            let mut tree = BPlusTree::open(&path, 128).unwrap();
            for &key in &keys {
                tree.put(key, common::value_of(key)).unwrap();
            }
            tree.close().unwrap();
        }

        let tree = BPlusTree::open(&path, 128).unwrap();
        let entries = tree.range(i32::MIN, i32::MAX).unwrap();
        let expected: Vec<_> = keys.iter().map(|&k| (k, common::value_of(k))).collect();
        prop_assert_eq!(entries, expected);
        tree.verify().unwrap();
    }
}
