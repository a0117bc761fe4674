//! Test that identical insert sequences produce identical files, whatever
//! the cache settings.

use std::fs;
use std::path::Path;

use crate::e2e_tests::helpers::*;
use crate::{BTree, BackingMode, EvictionPolicy, StoreConfig};

fn build(path: &Path, config: StoreConfig, seed: u64) -> Vec<u8> {
    {
        let mut tree: BTree<u64> = BTree::open(path, config).expect("open");
        for key in shuffled(1500, seed) {
            tree.insert(&key, key.rotate_left(17)).expect("insert");
        }
        tree.flush().expect("flush");
    }
    fs::read(path).expect("read file")
}

#[test]
fn test_same_seed_same_bytes() {
    let dir = TestDir::new();
    let first = build(&dir.path("a.idx"), small_pages(), 1234);
    let second = build(&dir.path("b.idx"), small_pages(), 1234);

    assert_eq!(first.len(), second.len());
    assert!(first == second, "files built from the same seed differ");
}

#[test]
fn test_cache_settings_do_not_change_layout() {
    let dir = TestDir::new();
    let reference = build(&dir.path("reference.idx"), small_pages(), 77);

    let variants = [
        small_pages().with_pages_max_count(1),
        small_pages()
            .with_pages_max_count(3)
            .with_eviction(EvictionPolicy::LeastRecentlyUsed),
        small_pages().with_backing(BackingMode::Buffered),
    ];
    for (n, config) in variants.into_iter().enumerate() {
        let bytes = build(&dir.path(&format!("variant-{n}.idx")), config, 77);
        assert!(bytes == reference, "variant {n} produced a different file");
    }
}

#[test]
fn test_different_seeds_same_contents() {
    let dir = TestDir::new();
    let mut a: BTree<u64> = BTree::open(&dir.path("a.idx"), small_pages()).expect("open");
    let mut b: BTree<u64> = BTree::open(&dir.path("b.idx"), small_pages()).expect("open");

    for key in shuffled(1000, 5) {
        a.insert(&key, key).expect("insert");
    }
    for key in shuffled(1000, 6) {
        b.insert(&key, key).expect("insert");
    }

    assert_eq!(scan(&mut a), scan(&mut b));
}
