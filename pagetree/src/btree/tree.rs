//! File-backed B+Tree.
//!
//! Nodes live in pages reached through the [`Pager`]. Page 0 is always the
//! root; it starts as an empty leaf and becomes an internal node on its first
//! split without changing its page number.
//!
//! Insertion splits full pages on the way down. After a split the descent
//! restarts from the root, so no parent pointers or path stack are needed:
//! the parent of a split page is the page the descent came from, and it is
//! never full because full pages are split before they are entered.
//!
//! Keys are compared with their `Ord` implementation. Duplicate keys are
//! allowed and keep their insertion order.

use std::marker::PhantomData;
use std::path::Path;

use crate::btree::node::{BTreePage, NodeError, NodeLayout};
use crate::codec::FixedWidth;
use crate::config::StoreConfig;
use crate::storage::{PageId, Pager, SUBTYPE_BTREE, StorageError};

/// Logical page number of the root.
pub const ROOT: PageId = 0;

/// A B+Tree stored in one file, mapping keys of type `K` to `u64` values.
pub struct BTree<K> {
    pager: Pager,
    layout: NodeLayout,
    _key: PhantomData<fn() -> K>,
}

impl<K: FixedWidth + Ord> BTree<K> {
    /// Open the tree stored at `path`, creating an empty one if the file is
    /// new.
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self, BTreeError> {
        config.validate().map_err(StorageError::from)?;
        let layout = NodeLayout::new(config.page_size, K::WIDTH)?;
        let pager = Pager::open(path, config, SUBTYPE_BTREE, K::WIDTH)?;

        let mut tree = Self {
            pager,
            layout,
            _key: PhantomData,
        };

        if tree.pager.header().must_initialize {
            if tree.pager.page_count() == 0 {
                tree.pager.allocate_page()?;
            }
            tree.page(ROOT)?.init(ROOT, true, true);
            tree.pager.update_header(|header| header.must_initialize = false);
            tracing::info!(
                path = %path.display(),
                key_width = K::WIDTH,
                max_keys = layout.max_keys(),
                "initialised empty tree"
            );
        }

        Ok(tree)
    }

    /// Number of pages in use, root included.
    #[must_use]
    pub const fn page_count(&self) -> u64 {
        self.pager.page_count()
    }

    /// Number of keys that fit in one page.
    #[must_use]
    pub const fn max_keys_count(&self) -> usize {
        self.layout.max_keys()
    }

    /// The page cache backing this tree.
    #[must_use]
    pub const fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Persist all mapped pages and the header.
    pub fn flush(&mut self) -> Result<(), BTreeError> {
        Ok(self.pager.flush()?)
    }

    /// Insert `key` with `value`. Existing equal keys are kept; the new entry
    /// is placed after them.
    pub fn insert(&mut self, key: &K, value: u64) -> Result<(), BTreeError> {
        'descent: loop {
            let mut parent = None;
            let mut current = ROOT;

            for _ in 0..=self.page_count() {
                let page = self.page(current)?;
                if page.is_full() {
                    self.split(parent, current)?;
                    continue 'descent;
                }

                if page.is_leaf() {
                    let mut page = page;
                    page.insert(key, value)?;
                    return Ok(());
                }

                let slot = page.find(key);
                let child = page.value(slot);
                parent = Some((current, slot));
                current = self.child(current, child)?;
            }

            return Err(BTreeError::Corrupt {
                page: current,
                reason: "descent is deeper than the page count".to_string(),
            });
        }
    }

    /// Return the value of the most recently inserted entry equal to `key`.
    pub fn get(&mut self, key: &K) -> Result<Option<u64>, BTreeError> {
        let mut current = ROOT;

        for _ in 0..=self.page_count() {
            let page = self.page(current)?;
            let position = page.find(key);

            if page.is_leaf() {
                let found = (position > 0 && page.key(position - 1) == *key)
                    .then(|| page.value(position - 1));
                return Ok(found);
            }

            let child = page.value(position);
            current = self.child(current, child)?;
        }

        Err(BTreeError::Corrupt {
            page: current,
            reason: "descent is deeper than the page count".to_string(),
        })
    }

    /// Cursor positioned at the smallest entry.
    pub fn cursor(&mut self) -> Result<Cursor<'_, K>, BTreeError> {
        let mut cursor = Cursor {
            tree: self,
            path: vec![Frame {
                page: ROOT,
                position: 0,
            }],
        };
        cursor.settle()?;
        Ok(cursor)
    }

    /// Verify the structure of the whole tree.
    ///
    /// Walks every page from the root and checks that:
    /// - each page records its own number and only page 0 is marked root
    /// - key counts are within page capacity and internal pages have keys
    /// - child numbers are non-zero and below the page count
    /// - keys and separators read in order are non-decreasing
    ///
    /// Returns `Ok(false)` on the first violation, which is logged. I/O
    /// failures are returned as errors.
    pub fn check(&mut self) -> Result<bool, BTreeError> {
        let mut last = None;
        self.check_page(ROOT, 0, &mut last)
    }

    fn check_page(
        &mut self,
        index: PageId,
        depth: u64,
        last: &mut Option<K>,
    ) -> Result<bool, BTreeError> {
        let page_count = self.page_count();
        if depth > page_count {
            tracing::warn!(page = index, depth, "tree is deeper than its page count");
            return Ok(false);
        }

        let layout = self.layout;
        let page: BTreePage<_, K> = BTreePage::new(self.pager.get_page(index)?, layout);

        if page.index() != index {
            tracing::warn!(page = index, stored = page.index(), "page number mismatch");
            return Ok(false);
        }
        if page.is_root() != (index == ROOT) {
            tracing::warn!(page = index, is_root = page.is_root(), "misplaced root flag");
            return Ok(false);
        }
        let count = page.keys_count();
        if count > layout.max_keys() {
            tracing::warn!(page = index, count, "key count exceeds page capacity");
            return Ok(false);
        }

        if page.is_leaf() {
            for position in 0..count {
                let key = page.key(position);
                if !in_order(last.as_ref(), &key) {
                    tracing::warn!(page = index, position, "leaf key out of order");
                    return Ok(false);
                }
                *last = Some(key);
            }
            return Ok(true);
        }

        if count == 0 {
            tracing::warn!(page = index, "internal page without keys");
            return Ok(false);
        }

        let keys: Vec<K> = (0..count).map(|i| page.key(i)).collect();
        let children: Vec<PageId> = (0..=count).map(|i| page.value(i)).collect();

        let mut separators = keys.into_iter();
        for (position, child) in children.into_iter().enumerate() {
            if child == ROOT || child >= page_count {
                tracing::warn!(page = index, position, child, "child pointer out of range");
                return Ok(false);
            }
            if !self.check_page(child, depth + 1, last)? {
                return Ok(false);
            }
            if let Some(separator) = separators.next() {
                if !in_order(last.as_ref(), &separator) {
                    tracing::warn!(page = index, position, "separator out of order");
                    return Ok(false);
                }
                *last = Some(separator);
            }
        }

        Ok(true)
    }

    /// Split the full page `current`. `parent` is the page the descent came
    /// from and the child slot it took there (`None` for the root).
    ///
    /// The new sibling goes into the parent right after `current`, at
    /// `values[slot + 1]`, even when the parent holds separators equal to the
    /// promoted key.
    fn split(
        &mut self,
        parent: Option<(PageId, usize)>,
        current: PageId,
    ) -> Result<(), BTreeError> {
        let layout = self.layout;
        let max = layout.max_keys();
        let left_count = max / 2;

        let snapshot: BTreePage<Vec<u8>, K> =
            BTreePage::new(self.pager.get_page(current)?.to_vec(), layout);
        let is_leaf = snapshot.is_leaf();
        let promoted = snapshot.key(left_count);

        // A leaf keeps its split key on the right; an internal page hands it
        // to the parent and keeps the children on both sides of it.
        let (left_values, right_keys, right_values) = if is_leaf {
            (0..left_count, left_count..max, left_count..max)
        } else {
            let right_first = left_count + 1;
            let value_slots = max + 1;
            (0..right_first, right_first..max, right_first..value_slots)
        };

        let sibling = match parent {
            None => {
                let left = self.new_page(ROOT)?;
                let right = self.new_page(ROOT)?;

                let mut page = self.page(left)?;
                page.set_leaf(is_leaf);
                page.copy_entries_from(&snapshot, 0..left_count, left_values);

                let mut page = self.page(right)?;
                page.set_leaf(is_leaf);
                page.copy_entries_from(&snapshot, right_keys, right_values);

                let mut root = self.page(ROOT)?;
                root.init(ROOT, false, true);
                root.set_key(0, &promoted);
                root.set_value(0, left);
                root.set_value(1, right);
                root.set_keys_count(1);
                right
            }
            Some((parent, slot)) => {
                let sibling = self.new_page(parent)?;

                let mut page = self.page(sibling)?;
                page.set_leaf(is_leaf);
                page.copy_entries_from(&snapshot, right_keys, right_values);

                self.page(current)?.truncate(left_count);
                self.page(parent)?.insert_at(slot, &promoted, sibling)?;
                sibling
            }
        };

        tracing::debug!(
            page = current,
            sibling,
            root = parent.is_none(),
            leaf = is_leaf,
            "split page"
        );
        Ok(())
    }

    /// Append a new empty non-root leaf below `parent` and return its number.
    fn new_page(&mut self, parent: PageId) -> Result<PageId, BTreeError> {
        let index = self.pager.allocate_page()?;
        self.page(index)?.init(index, true, false);
        tracing::trace!(page = index, parent, "created tree page");
        Ok(index)
    }

    /// Typed view of page `index`, rejecting pages with an impossible key count.
    fn page(&mut self, index: PageId) -> Result<BTreePage<&mut [u8], K>, BTreeError> {
        let layout = self.layout;
        let page = BTreePage::new(self.pager.get_page(index)?, layout);
        if page.keys_count() > layout.max_keys() {
            return Err(BTreeError::Corrupt {
                page: index,
                reason: format!(
                    "key count {} exceeds capacity {}",
                    page.keys_count(),
                    layout.max_keys()
                ),
            });
        }
        Ok(page)
    }

    /// Validate a child pointer read from page `page`.
    fn child(&self, page: PageId, child: u64) -> Result<PageId, BTreeError> {
        if child == ROOT || child >= self.page_count() {
            return Err(BTreeError::Corrupt {
                page,
                reason: format!(
                    "child pointer {child} outside 1..{}",
                    self.page_count()
                ),
            });
        }
        Ok(child)
    }
}

fn in_order<K: Ord>(last: Option<&K>, key: &K) -> bool {
    last.is_none_or(|last| last <= key)
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    page: PageId,
    /// Entry in a leaf, or child being visited in an internal page.
    position: usize,
}

/// In-order cursor over the entries of a tree.
///
/// Holds the path from the root to the current leaf entry. The cursor is at
/// its end once the path is empty.
pub struct Cursor<'t, K> {
    tree: &'t mut BTree<K>,
    path: Vec<Frame>,
}

impl<K: FixedWidth + Ord> Cursor<'_, K> {
    /// Whether the cursor has moved past the last entry.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.path.is_empty()
    }

    /// The entry under the cursor, or `None` at the end.
    pub fn entry(&mut self) -> Result<Option<(K, u64)>, BTreeError> {
        let Some(frame) = self.path.last().copied() else {
            return Ok(None);
        };
        let page = self.tree.page(frame.page)?;
        Ok(Some((page.key(frame.position), page.value(frame.position))))
    }

    /// Move to the next entry in key order.
    pub fn advance(&mut self) -> Result<(), BTreeError> {
        if let Some(frame) = self.path.last_mut() {
            frame.position += 1;
            self.settle()?;
        }
        Ok(())
    }

    /// Move from the current path to the next existing leaf entry,
    /// descending into children and popping exhausted pages as needed.
    fn settle(&mut self) -> Result<(), BTreeError> {
        while let Some(frame) = self.path.last().copied() {
            let page = self.tree.page(frame.page)?;
            let count = page.keys_count();

            if page.is_leaf() {
                if frame.position < count {
                    return Ok(());
                }
            } else if frame.position <= count {
                let child = page.value(frame.position);
                let child = self.tree.child(frame.page, child)?;
                if self.path.len() as u64 > self.tree.page_count() {
                    return Err(BTreeError::Corrupt {
                        page: child,
                        reason: "descent is deeper than the page count".to_string(),
                    });
                }
                self.path.push(Frame {
                    page: child,
                    position: 0,
                });
                continue;
            }

            self.path.pop();
            if let Some(parent) = self.path.last_mut() {
                parent.position += 1;
            }
        }
        Ok(())
    }
}

impl<K: FixedWidth + Ord> Iterator for Cursor<'_, K> {
    type Item = Result<(K, u64), BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.entry().and_then(|entry| {
            self.advance()?;
            Ok(entry)
        });
        match step {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.path.clear();
                Some(Err(e))
            }
        }
    }
}

/// Errors that can occur during B+Tree operations.
#[derive(Debug)]
pub enum BTreeError {
    /// File or page cache error.
    Storage(StorageError),
    /// Page layout error.
    Node(NodeError),
    /// A page holds values no valid tree can contain.
    Corrupt { page: PageId, reason: String },
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Corrupt { page, reason } => write!(f, "corrupt page {page}: {reason}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Corrupt { .. } => None,
        }
    }
}

impl From<StorageError> for BTreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for BTreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // 256 byte pages hold (256 - 24) / 16 = 14 u64 keys.
    fn small_pages() -> StoreConfig {
        StoreConfig::default()
            .with_page_size(256)
            .with_reserve_size(64 * 1024)
            .with_pages_max_count(8)
    }

    fn create_test_tree() -> (tempfile::TempDir, BTree<u64>) {
        let dir = tempdir().expect("create temp dir");
        let tree = BTree::open(&dir.path().join("test.idx"), small_pages()).expect("open tree");
        (dir, tree)
    }

    fn collect(tree: &mut BTree<u64>) -> Vec<(u64, u64)> {
        tree.cursor()
            .expect("cursor")
            .collect::<Result<Vec<_>, _>>()
            .expect("scan")
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, mut tree) = create_test_tree();

        assert_eq!(tree.page_count(), 1);
        assert_eq!(tree.max_keys_count(), 14);
        assert!(tree.cursor().expect("cursor").is_end());
        assert_eq!(tree.get(&1).expect("get"), None);
        assert!(tree.check().expect("check"));
    }

    #[test]
    fn test_btree_basic_operations() {
        let (_dir, mut tree) = create_test_tree();

        tree.insert(&2, 20).expect("insert 2");
        tree.insert(&1, 10).expect("insert 1");
        tree.insert(&3, 30).expect("insert 3");

        assert_eq!(tree.get(&1).expect("get 1"), Some(10));
        assert_eq!(tree.get(&2).expect("get 2"), Some(20));
        assert_eq!(tree.get(&3).expect("get 3"), Some(30));
        assert_eq!(tree.get(&4).expect("get 4"), None);
        assert_eq!(collect(&mut tree), vec![(1, 10), (2, 20), (3, 30)]);
    }

    #[test]
    fn test_root_leaf_split() {
        let (_dir, mut tree) = create_test_tree();

        for key in 0..=14_u64 {
            tree.insert(&key, key).expect("insert");
        }

        assert_eq!(tree.page_count(), 3);
        let root = tree.page(ROOT).expect("root");
        assert!(!root.is_leaf());
        assert!(root.is_root());
        assert_eq!(root.keys_count(), 1);
        assert_eq!(root.key(0), 7);
        assert_eq!((root.value(0), root.value(1)), (1, 2));

        let left = tree.page(1).expect("left");
        assert!(left.is_leaf());
        assert!(!left.is_root());
        assert_eq!(left.keys_count(), 7);

        let right = tree.page(2).expect("right");
        assert_eq!(right.keys_count(), 8);
        assert_eq!(right.key(0), 7);

        assert!(tree.check().expect("check"));
    }

    #[test]
    fn test_non_root_leaf_split() {
        let (_dir, mut tree) = create_test_tree();

        for key in 0..30_u64 {
            tree.insert(&key, key).expect("insert");
        }

        let root = tree.page(ROOT).expect("root");
        assert!(!root.is_leaf());
        assert!(root.keys_count() >= 2);
        assert!(tree.check().expect("check"));
        assert_eq!(
            collect(&mut tree),
            (0..30).map(|k| (k, k)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_internal_splits_grow_height() {
        let (_dir, mut tree) = create_test_tree();

        for key in (0..2000_u64).rev() {
            tree.insert(&key, key * 2).expect("insert");
        }

        let first_child = tree.page(ROOT).expect("root").value(0);
        let child = tree.page(first_child).expect("child");
        assert!(!child.is_leaf(), "height is at least three");

        assert!(tree.check().expect("check"));
        let entries = collect(&mut tree);
        assert_eq!(entries.len(), 2000);
        assert!(entries.iter().enumerate().all(|(i, &(k, v))| k == i as u64 && v == k * 2));
        for key in [0_u64, 1, 999, 1999] {
            assert_eq!(tree.get(&key).expect("get"), Some(key * 2));
        }
    }

    #[test]
    fn test_duplicate_keys() {
        let (_dir, mut tree) = create_test_tree();

        for round in 0..5_u64 {
            for key in 0..10_u64 {
                tree.insert(&key, round).expect("insert");
            }
        }

        assert!(tree.check().expect("check"));
        let entries = collect(&mut tree);
        assert_eq!(entries.len(), 50);
        for key in 0..10_u64 {
            let values: Vec<u64> = entries
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|&(_, v)| v)
                .collect();
            assert_eq!(values, vec![0, 1, 2, 3, 4], "duplicates keep insertion order");
            assert_eq!(tree.get(&key).expect("get"), Some(4));
        }
    }

    #[test]
    fn test_duplicate_run_split_keeps_insertion_order() {
        let (_dir, mut tree) = create_test_tree();

        // A full root leaf of one key splits into two halves of that key,
        // then smaller keys fill and split the left half again.
        for value in 0..14_u64 {
            tree.insert(&50, value).expect("insert");
        }
        for key in 10..18_u64 {
            tree.insert(&key, 100 + key).expect("insert");
        }
        assert_eq!(tree.page_count(), 4);
        assert!(tree.check().expect("check"));

        let duplicates: Vec<u64> = collect(&mut tree)
            .into_iter()
            .filter(|&(key, _)| key == 50)
            .map(|(_, value)| value)
            .collect();
        assert_eq!(duplicates, (0..14).collect::<Vec<_>>());
        assert_eq!(tree.get(&50).expect("get"), Some(13));

        tree.insert(&50, 14).expect("insert");
        assert_eq!(tree.get(&50).expect("get"), Some(14));
        let last = collect(&mut tree).last().copied();
        assert_eq!(last, Some((50, 14)));
    }

    #[test]
    fn test_cursor_manual_stepping() {
        let (_dir, mut tree) = create_test_tree();
        for key in [5_u64, 1, 3] {
            tree.insert(&key, key + 100).expect("insert");
        }

        let mut cursor = tree.cursor().expect("cursor");
        assert_eq!(cursor.entry().expect("entry"), Some((1, 101)));
        cursor.advance().expect("advance");
        assert_eq!(cursor.entry().expect("entry"), Some((3, 103)));
        cursor.advance().expect("advance");
        assert_eq!(cursor.entry().expect("entry"), Some((5, 105)));
        cursor.advance().expect("advance");
        assert!(cursor.is_end());
        assert_eq!(cursor.entry().expect("entry"), None);
        cursor.advance().expect("advance past end is a no-op");
        assert!(cursor.is_end());
    }

    #[test]
    fn test_check_detects_misordered_keys() {
        let (_dir, mut tree) = create_test_tree();
        for key in 0..40_u64 {
            tree.insert(&key, key).expect("insert");
        }
        assert!(tree.check().expect("check"));

        let mut leaf = tree.page(1).expect("leaf");
        leaf.set_key(0, &1000);
        assert!(!tree.check().expect("check"));
    }

    #[test]
    fn test_check_detects_bad_child_pointer() {
        let (_dir, mut tree) = create_test_tree();
        for key in 0..20_u64 {
            tree.insert(&key, key).expect("insert");
        }

        tree.page(ROOT).expect("root").set_value(1, 999);
        assert!(!tree.check().expect("check"));
        assert!(matches!(
            tree.insert(&100, 0),
            Err(BTreeError::Corrupt { page: ROOT, .. })
        ));
    }

    #[test]
    fn test_insert_detects_child_cycle() {
        let (_dir, mut tree) = create_test_tree();
        for key in 0..20_u64 {
            tree.insert(&key, key).expect("insert");
        }

        // Turn the left leaf into an internal page whose children are itself.
        let mut page = tree.page(1).expect("page");
        page.set_leaf(false);
        page.set_keys_count(1);
        page.set_value(0, 1);
        page.set_value(1, 1);

        assert!(matches!(
            tree.insert(&5, 0),
            Err(BTreeError::Corrupt { page: 1, .. })
        ));
        assert!(matches!(
            tree.get(&5),
            Err(BTreeError::Corrupt { page: 1, .. })
        ));
    }

    #[test]
    fn test_check_detects_wrong_page_number() {
        let (_dir, mut tree) = create_test_tree();
        for key in 0..20_u64 {
            tree.insert(&key, key).expect("insert");
        }

        tree.page(2).expect("page").set_index(7);
        assert!(!tree.check().expect("check"));
    }

    #[test]
    fn test_tree_persists_across_reopen() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");

        {
            let mut tree: BTree<u64> = BTree::open(&path, small_pages()).expect("open");
            for key in 0..500_u64 {
                tree.insert(&(key * 7 % 500), key).expect("insert");
            }
            tree.flush().expect("flush");
        }

        let mut tree: BTree<u64> = BTree::open(&path, small_pages()).expect("reopen");
        assert!(tree.check().expect("check"));
        let keys: Vec<u64> = collect(&mut tree).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, (0..500).collect::<Vec<_>>());

        tree.insert(&1000, 1).expect("insert after reopen");
        assert_eq!(tree.get(&1000).expect("get"), Some(1));
    }

    #[test]
    fn test_open_rejects_tiny_layout() {
        let dir = tempdir().expect("create temp dir");
        let config = StoreConfig::default().with_page_size(64);

        let result = BTree::<[u8; 16]>::open(&dir.path().join("test.idx"), config);
        assert!(matches!(
            result,
            Err(BTreeError::Node(NodeError::LayoutTooSmall { .. }))
        ));
    }
}
