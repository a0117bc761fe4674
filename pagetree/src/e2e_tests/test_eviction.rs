//! Test trees that are much larger than the page cache, for every eviction
//! policy and backing mode.

use std::collections::BTreeMap;

use crate::e2e_tests::helpers::*;
use crate::{BTree, BackingMode, EvictionPolicy};

const CACHE_PAGES: usize = 3;

fn build_and_verify(eviction: EvictionPolicy, backing: BackingMode) {
    let dir = TestDir::new();
    let path = dir.path("evict.idx");
    let config = small_pages()
        .with_pages_max_count(CACHE_PAGES)
        .with_eviction(eviction)
        .with_backing(backing);

    let order = shuffled(2500, 17);
    let reference: BTreeMap<u64, u64> = order.iter().map(|&k| (k, k ^ 0xFFFF)).collect();

    {
        let mut tree: BTree<u64> = BTree::open(&path, config).expect("open");
        for &key in &order {
            tree.insert(&key, key ^ 0xFFFF).expect("insert");
            assert!(tree.pager().cached_pages() <= CACHE_PAGES);
        }
        assert!(tree.page_count() > 100, "tree spans far more pages than the cache");
        assert!(tree.check().expect("check"));

        let expected: Vec<(u64, u64)> = reference.iter().map(|(&k, &v)| (k, v)).collect();
        assert_eq!(scan(&mut tree), expected);
    }

    let mut tree: BTree<u64> = BTree::open(&path, config).expect("reopen");
    assert!(tree.check().expect("check after reopen"));
    for key in shuffled(2500, 18) {
        assert_eq!(tree.get(&key).expect("get"), reference.get(&key).copied());
    }
}

#[test]
fn test_least_used_mapped() {
    build_and_verify(EvictionPolicy::LeastUsed, BackingMode::Mapped);
}

#[test]
fn test_least_used_buffered() {
    build_and_verify(EvictionPolicy::LeastUsed, BackingMode::Buffered);
}

#[test]
fn test_least_recently_used_mapped() {
    build_and_verify(EvictionPolicy::LeastRecentlyUsed, BackingMode::Mapped);
}

#[test]
fn test_least_recently_used_buffered() {
    build_and_verify(EvictionPolicy::LeastRecentlyUsed, BackingMode::Buffered);
}

#[test]
fn test_single_page_cache() {
    let dir = TestDir::new();
    let config = small_pages().with_pages_max_count(1);
    let mut tree: BTree<u64> = BTree::open(&dir.path("one.idx"), config).expect("open");

    for key in shuffled(500, 3) {
        tree.insert(&key, key).expect("insert");
    }

    assert!(tree.check().expect("check"));
    assert_eq!(scan(&mut tree).len(), 500);
}
