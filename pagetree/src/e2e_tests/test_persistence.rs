//! Test that trees and counters survive being closed and reopened.

use std::fs;

use crate::e2e_tests::helpers::*;
use crate::{BTree, BackingMode, Counter, StoreConfig};

fn reopen_tree(backing: BackingMode) {
    let dir = TestDir::new();
    let path = dir.path("persist.idx");
    let config = small_pages().with_backing(backing);

    let first = shuffled(800, 21);
    {
        let mut tree: BTree<u64> = BTree::open(&path, config).expect("open");
        for &key in &first {
            tree.insert(&key, key * 2).expect("insert");
        }
    }

    let page_count = {
        let mut tree: BTree<u64> = BTree::open(&path, config).expect("reopen");
        assert!(tree.check().expect("check"));
        assert_eq!(tree.get(&799).expect("get"), Some(1598));

        // Keep growing the reopened tree.
        for key in 800..1200 {
            tree.insert(&key, key * 2).expect("insert");
        }
        tree.page_count()
    };

    let mut tree: BTree<u64> = BTree::open(&path, config).expect("reopen again");
    assert_eq!(tree.page_count(), page_count);
    assert!(tree.check().expect("check"));
    let expected: Vec<(u64, u64)> = (0..1200).map(|k| (k, k * 2)).collect();
    assert_eq!(scan(&mut tree), expected);
}

#[test]
fn test_reopen_mapped_tree() {
    reopen_tree(BackingMode::Mapped);
}

#[test]
fn test_reopen_buffered_tree() {
    reopen_tree(BackingMode::Buffered);
}

#[test]
fn test_file_grows_in_reserve_steps() {
    let dir = TestDir::new();
    let path = dir.path("grow.idx");
    let config = small_pages().with_reserve_size(4096);

    let mut tree: BTree<u64> = BTree::open(&path, config).expect("open");
    for key in shuffled(2000, 8) {
        tree.insert(&key, key).expect("insert");
        assert_eq!(tree.pager().file_size() % 4096, 0);
    }
    tree.flush().expect("flush");

    let len = fs::metadata(&path).expect("metadata").len();
    assert_eq!(len % 4096, 0);
    assert!(len >= (tree.page_count() + 1) * 256, "header and pages fit");
}

#[test]
fn test_empty_tree_reopens_empty() {
    let dir = TestDir::new();
    let path = dir.path("empty.idx");
    drop(BTree::<u64>::open(&path, StoreConfig::default()).expect("create"));

    let mut tree: BTree<u64> = BTree::open(&path, StoreConfig::default()).expect("reopen");
    assert_eq!(tree.page_count(), 1);
    assert!(tree.check().expect("check"));
    assert!(scan(&mut tree).is_empty());
}

#[test]
fn test_counter_reopen_continues_ids() {
    let dir = TestDir::new();
    let path = dir.path("records.cnt");

    for backing in [BackingMode::Mapped, BackingMode::Buffered] {
        let config = small_pages().with_pages_max_count(2).with_backing(backing);
        let start = {
            let mut counter: Counter<u64> = Counter::open(&path, config).expect("open");
            let start = counter.len();
            for n in 0..100 {
                assert_eq!(counter.append(&(n * 3)).expect("append"), start + n + 1);
            }
            start
        };

        let mut counter: Counter<u64> = Counter::open(&path, config).expect("reopen");
        assert_eq!(counter.len(), start + 100);
        for n in 0..100 {
            assert_eq!(counter.get(start + n + 1).expect("get"), Some(n * 3));
        }
        assert_eq!(counter.get(start + 101).expect("get"), None);
    }
}
