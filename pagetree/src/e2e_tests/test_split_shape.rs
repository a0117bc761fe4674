//! Test the page layout produced by the first root split, read back through
//! a separate pager on the same file.

use crate::btree::{BTreePage, NodeLayout, ROOT};
use crate::e2e_tests::helpers::*;
use crate::storage::{Pager, SUBTYPE_BTREE};
use crate::{BTree, StoreConfig};

#[test]
fn test_first_split_creates_two_children() {
    let dir = TestDir::new();
    let path = dir.path("split.idx");
    let config = StoreConfig::default();

    let max = {
        let mut tree: BTree<u64> = BTree::open(&path, config).expect("open");
        let max = tree.max_keys_count();
        assert_eq!(max, 254);

        for key in 0..max as u64 {
            tree.insert(&key, key).expect("insert");
        }
        assert_eq!(tree.page_count(), 1, "root leaf holds max keys unsplit");

        tree.insert(&(max as u64), 0).expect("insert");
        assert_eq!(tree.page_count(), 3);
        assert!(tree.check().expect("check"));
        max
    };

    let layout = NodeLayout::new(config.page_size, 8).expect("layout");
    let mut pager = Pager::open(&path, config, SUBTYPE_BTREE, 8).expect("open pager");

    let root: BTreePage<_, u64> = BTreePage::new(pager.get_page(ROOT).expect("root"), layout);
    assert!(root.is_root());
    assert!(!root.is_leaf());
    assert_eq!(root.keys_count(), 1);
    let separator = root.key(0);
    let (left, right) = (root.value(0), root.value(1));
    assert_eq!((left, right), (1, 2));

    let left_page: BTreePage<_, u64> = BTreePage::new(pager.get_page(left).expect("left"), layout);
    assert!(left_page.is_leaf());
    assert!(!left_page.is_root());
    assert_eq!(left_page.index(), 1);
    assert_eq!(left_page.keys_count(), max / 2);
    assert!(left_page.key(left_page.keys_count() - 1) < separator);

    let right_page: BTreePage<_, u64> =
        BTreePage::new(pager.get_page(right).expect("right"), layout);
    assert!(right_page.is_leaf());
    assert_eq!(right_page.index(), 2);
    assert_eq!(right_page.keys_count(), max + 1 - max / 2);
    assert_eq!(right_page.key(0), separator);
}

#[test]
fn test_internal_root_split_keeps_tree_valid() {
    let dir = TestDir::new();
    let mut tree: BTree<u64> = BTree::open(&dir.path("deep.idx"), small_pages()).expect("open");

    // With 14 keys per page the root splits as an internal page after a few
    // hundred inserts; check after every insert around that point.
    for (count, key) in shuffled(600, 11).into_iter().enumerate() {
        tree.insert(&key, key).expect("insert");
        if count % 25 == 0 || (150..250).contains(&count) {
            assert!(tree.check().expect("check"), "after {count} inserts");
        }
    }

    assert!(tree.check().expect("check"));
    assert_eq!(scan(&mut tree).len(), 600);
}
