//! Test that cursor order and lookups match a reference map for any
//! insertion order.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::BTree;
use crate::e2e_tests::helpers::*;

fn check_against_reference(order: &[u64]) {
    let dir = TestDir::new();
    let mut tree: BTree<u64> = BTree::open(&dir.path("ordering.idx"), small_pages()).expect("open");
    let mut reference = BTreeMap::new();

    for (value, &key) in (0_u64..).zip(order) {
        tree.insert(&key, value).expect("insert");
        reference.insert(key, value);
    }

    assert!(tree.check().expect("check"));

    let entries = scan(&mut tree);
    let expected: Vec<(u64, u64)> = reference.iter().map(|(&k, &v)| (k, v)).collect();
    assert_eq!(entries, expected);

    for (key, value) in &reference {
        assert_eq!(tree.get(key).expect("get"), Some(*value), "key {key}");
    }
    assert_eq!(tree.get(&u64::MAX).expect("get"), None);
}

#[test]
fn test_ascending_inserts() {
    let order: Vec<u64> = (0..3000).collect();
    check_against_reference(&order);
}

#[test]
fn test_descending_inserts() {
    let order: Vec<u64> = (0..3000).rev().collect();
    check_against_reference(&order);
}

#[test]
fn test_shuffled_inserts() {
    for seed in [1, 2, 3, 42] {
        check_against_reference(&shuffled(3000, seed));
    }
}

#[test]
fn test_sparse_keys() {
    let order: Vec<u64> = shuffled(1000, 7)
        .into_iter()
        .map(|k| k.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .collect();
    check_against_reference(&order);
}

#[test]
fn test_duplicates_match_reference() {
    let dir = TestDir::new();
    let mut tree: BTree<u64> = BTree::open(&dir.path("dups.idx"), small_pages()).expect("open");
    let mut reference: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(99);

    for value in 0..3000_u64 {
        let key = rng.random_range(0..200_u64);
        tree.insert(&key, value).expect("insert");
        reference.entry(key).or_default().push(value);
    }

    assert!(tree.check().expect("check"));

    let expected: Vec<(u64, u64)> = reference
        .iter()
        .flat_map(|(&k, values)| values.iter().map(move |&v| (k, v)))
        .collect();
    assert_eq!(scan(&mut tree), expected);

    for (key, values) in &reference {
        assert_eq!(tree.get(key).expect("get"), values.last().copied());
    }
}

#[test]
fn test_duplicate_runs_across_splits() {
    let dir = TestDir::new();
    let mut tree: BTree<u64> = BTree::open(&dir.path("runs.idx"), small_pages()).expect("open");
    let mut reference: BTreeMap<u64, Vec<u64>> = BTreeMap::new();

    // Long runs of a few keys, interleaved with descending smaller keys, so
    // pages made only of one key split next to equal separators.
    let mut value = 0_u64;
    for key in (0..300_u64).rev() {
        let hot = [1000, 2000, 3000][usize::try_from(key % 3).expect("small index")];
        for k in [key, hot, hot] {
            tree.insert(&k, value).expect("insert");
            reference.entry(k).or_default().push(value);
            value += 1;
        }
    }

    assert!(tree.check().expect("check"));
    let expected: Vec<(u64, u64)> = reference
        .iter()
        .flat_map(|(&k, values)| values.iter().map(move |&v| (k, v)))
        .collect();
    assert_eq!(scan(&mut tree), expected);

    for (key, values) in &reference {
        assert_eq!(tree.get(key).expect("get"), values.last().copied(), "key {key}");
    }
}
