//! B+Tree page layout.
//!
//! A page holds either a leaf (keys and their payloads) or an internal node
//! (keys and child page numbers). Both share one layout:
//!
//! ```text
//! offset 0   is_leaf     u8
//! offset 1   is_root     u8
//! offset 2   reserved    2 bytes
//! offset 4   keys_count  u32
//! offset 8   index       u64 (the page's own logical number)
//! offset 16  keys        max_keys_count * key_width bytes
//!            values      (max_keys_count + 1) * 8 bytes
//! ```
//!
//! In a leaf, `values[i]` is the payload of `keys[i]`. In an internal node,
//! child `values[i]` holds the keys `k` with `keys[i - 1] <= k < keys[i]`,
//! so there are `keys_count + 1` children.

// keys_count <= max_keys_count, and max_keys_count < page_size which fits in u32.
#![allow(clippy::cast_possible_truncation)]

use std::marker::PhantomData;
use std::ops::Range;

use crate::codec::FixedWidth;
use crate::storage::page::{PageId, read_u8, read_u32, read_u64, write_u8, write_u32, write_u64};

/// Page header field offsets.
mod offsets {
    pub const IS_LEAF: usize = 0;
    pub const IS_ROOT: usize = 1;
    pub const KEYS_COUNT: usize = 4;
    pub const INDEX: usize = 8;
}

/// Byte geometry of a page for one key width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    page_size: usize,
    key_width: usize,
    max_keys: usize,
}

impl NodeLayout {
    /// Size of the page header.
    pub const HEADER_SIZE: usize = 16;
    /// Size of one value slot.
    pub const VALUE_SIZE: usize = 8;
    /// Fewest keys per page for which splitting makes progress.
    pub const MIN_KEYS: usize = 3;

    /// Compute the layout for `page_size` pages holding `key_width` byte keys.
    pub fn new(page_size: usize, key_width: usize) -> Result<Self, NodeError> {
        let max_keys = Self::max_keys_count(page_size, key_width);
        if key_width == 0 || max_keys < Self::MIN_KEYS {
            return Err(NodeError::LayoutTooSmall {
                page_size,
                key_width,
                max_keys,
            });
        }
        Ok(Self {
            page_size,
            key_width,
            max_keys,
        })
    }

    /// Number of keys that fit in a page.
    ///
    /// A page holds the header, `n` keys and `n + 1` values:
    /// `HEADER_SIZE + n * key_width + (n + 1) * VALUE_SIZE <= page_size`.
    #[must_use]
    pub const fn max_keys_count(page_size: usize, key_width: usize) -> usize {
        page_size.saturating_sub(Self::HEADER_SIZE + Self::VALUE_SIZE)
            / (key_width + Self::VALUE_SIZE)
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub const fn max_keys(&self) -> usize {
        self.max_keys
    }

    const fn key_offset(&self, index: usize) -> usize {
        Self::HEADER_SIZE + index * self.key_width
    }

    const fn value_offset(&self, index: usize) -> usize {
        Self::HEADER_SIZE + self.max_keys * self.key_width + index * Self::VALUE_SIZE
    }
}

/// A typed view over the bytes of one B+Tree page.
///
/// `B` is anything that derefs to the page bytes: the pager's `&mut [u8]`
/// for in-place updates, or an owned `Vec<u8>` snapshot while splitting.
pub struct BTreePage<B, K> {
    buf: B,
    layout: NodeLayout,
    _key: PhantomData<fn() -> K>,
}

impl<B: AsRef<[u8]>, K: FixedWidth + Ord> BTreePage<B, K> {
    /// Wrap page bytes. `buf` must be at least `layout.page_size()` long.
    #[must_use]
    pub fn new(buf: B, layout: NodeLayout) -> Self {
        debug_assert!(buf.as_ref().len() >= layout.page_size());
        Self {
            buf,
            layout,
            _key: PhantomData,
        }
    }

    fn bytes(&self) -> &[u8] {
        self.buf.as_ref()
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        read_u8(self.bytes(), offsets::IS_LEAF) != 0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        read_u8(self.bytes(), offsets::IS_ROOT) != 0
    }

    /// The page's own logical number, as stored in the page.
    #[must_use]
    pub fn index(&self) -> PageId {
        read_u64(self.bytes(), offsets::INDEX)
    }

    #[must_use]
    pub fn keys_count(&self) -> usize {
        read_u32(self.bytes(), offsets::KEYS_COUNT) as usize
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.keys_count() >= self.layout.max_keys
    }

    /// Decode the key at `index`.
    #[must_use]
    pub fn key(&self, index: usize) -> K {
        let start = self.layout.key_offset(index);
        K::decode(&self.bytes()[start..start + self.layout.key_width])
    }

    /// The payload (leaf) or child page number (internal) at `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> u64 {
        read_u64(self.bytes(), self.layout.value_offset(index))
    }

    /// Position of the first key strictly greater than `key`.
    ///
    /// In an internal node this is the child to descend into. In a leaf it
    /// is where `key` would be inserted after any equal keys.
    #[must_use]
    pub fn find(&self, key: &K) -> usize {
        let mut low = 0;
        let mut high = self.keys_count();
        while low < high {
            let mid = low + (high - low) / 2;
            if self.key(mid) <= *key {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: FixedWidth + Ord> BTreePage<B, K> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    /// Reset the page to an empty node numbered `index`.
    pub fn init(&mut self, index: PageId, is_leaf: bool, is_root: bool) {
        let page_size = self.layout.page_size;
        self.bytes_mut()[..page_size].fill(0);
        self.set_leaf(is_leaf);
        self.set_root(is_root);
        self.set_index(index);
    }

    pub fn set_leaf(&mut self, is_leaf: bool) {
        write_u8(self.bytes_mut(), offsets::IS_LEAF, u8::from(is_leaf));
    }

    pub fn set_root(&mut self, is_root: bool) {
        write_u8(self.bytes_mut(), offsets::IS_ROOT, u8::from(is_root));
    }

    pub fn set_index(&mut self, index: PageId) {
        write_u64(self.bytes_mut(), offsets::INDEX, index);
    }

    pub fn set_keys_count(&mut self, count: usize) {
        debug_assert!(count <= self.layout.max_keys);
        write_u32(self.bytes_mut(), offsets::KEYS_COUNT, count as u32);
    }

    pub fn set_key(&mut self, index: usize, key: &K) {
        let start = self.layout.key_offset(index);
        let end = start + self.layout.key_width;
        key.encode(&mut self.bytes_mut()[start..end]);
    }

    pub fn set_value(&mut self, index: usize, value: u64) {
        let offset = self.layout.value_offset(index);
        write_u64(self.bytes_mut(), offset, value);
    }

    /// Insert `key` at position `index`, shifting later entries right.
    ///
    /// In a leaf `value` lands in `values[index]`. In an internal node it is
    /// the child to the right of `key` and lands in `values[index + 1]`.
    pub fn insert_at(&mut self, index: usize, key: &K, value: u64) -> Result<(), NodeError> {
        let count = self.keys_count();
        if count >= self.layout.max_keys {
            return Err(NodeError::PageFull {
                page: self.index(),
                max_keys: self.layout.max_keys,
            });
        }
        debug_assert!(index <= count);

        let layout = self.layout;
        let bytes = self.bytes_mut();
        bytes.copy_within(
            layout.key_offset(index)..layout.key_offset(count),
            layout.key_offset(index + 1),
        );

        let value_index = if self.is_leaf() { index } else { index + 1 };
        let value_end = if self.is_leaf() { count } else { count + 1 };
        self.bytes_mut().copy_within(
            layout.value_offset(value_index)..layout.value_offset(value_end),
            layout.value_offset(value_index + 1),
        );

        self.set_key(index, key);
        self.set_value(value_index, value);
        self.set_keys_count(count + 1);
        Ok(())
    }

    /// Insert `key` after any keys equal to it. Returns its position.
    pub fn insert(&mut self, key: &K, value: u64) -> Result<usize, NodeError> {
        let index = self.find(key);
        self.insert_at(index, key, value)?;
        Ok(index)
    }

    /// Keep only the first `count` keys.
    pub fn truncate(&mut self, count: usize) {
        debug_assert!(count <= self.keys_count());
        self.set_keys_count(count);
    }

    /// Overwrite this page's entries with a range of `source`'s entries.
    ///
    /// Keys `source[keys]` land at positions `0..keys.len()` and value slots
    /// `source[values]` at `0..values.len()`. The key count becomes
    /// `keys.len()`; flags and index are left untouched.
    pub fn copy_entries_from<S: AsRef<[u8]>>(
        &mut self,
        source: &BTreePage<S, K>,
        keys: Range<usize>,
        values: Range<usize>,
    ) {
        let layout = self.layout;
        let key_count = keys.len();

        let src = source.bytes();
        let key_bytes = layout.key_offset(keys.start)..layout.key_offset(keys.end);
        let value_bytes = layout.value_offset(values.start)..layout.value_offset(values.end);
        let key_len = key_bytes.len();
        let value_len = value_bytes.len();

        let dst = self.buf.as_mut();
        let key_dst = layout.key_offset(0);
        dst[key_dst..key_dst + key_len].copy_from_slice(&src[key_bytes]);
        let value_dst = layout.value_offset(0);
        dst[value_dst..value_dst + value_len].copy_from_slice(&src[value_bytes]);

        self.set_keys_count(key_count);
    }
}

/// Errors that can occur when working with B+Tree pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Insert into a page that already holds `max_keys` keys.
    PageFull { page: PageId, max_keys: usize },
    /// Pages of this size cannot hold enough keys of this width.
    LayoutTooSmall {
        page_size: usize,
        key_width: usize,
        max_keys: usize,
    },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PageFull { page, max_keys } => {
                write!(f, "page {page} is full ({max_keys} keys)")
            }
            Self::LayoutTooSmall {
                page_size,
                key_width,
                max_keys,
            } => write!(
                f,
                "{page_size} byte pages hold only {max_keys} keys of {key_width} bytes (need {})",
                NodeLayout::MIN_KEYS
            ),
        }
    }
}

impl std::error::Error for NodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> NodeLayout {
        // (256 - 24) / 16 = 14 keys
        NodeLayout::new(256, 8).expect("layout")
    }

    fn leaf(index: PageId) -> BTreePage<Vec<u8>, u64> {
        let mut page = BTreePage::new(vec![0xEE; 256], layout());
        page.init(index, true, false);
        page
    }

    fn keys<B: AsRef<[u8]>>(page: &BTreePage<B, u64>) -> Vec<u64> {
        (0..page.keys_count()).map(|i| page.key(i)).collect()
    }

    #[test]
    fn test_capacity_derivation() {
        for (page_size, key_width) in [(4096, 8), (4096, 256), (8192, 32), (256, 8), (128, 17)] {
            let max = NodeLayout::max_keys_count(page_size, key_width);
            assert!(16 + max * (key_width + 8) <= page_size);
            assert!(16 + (max + 1) * (key_width + 8) + 8 > page_size);
        }
        assert_eq!(NodeLayout::max_keys_count(4096, 8), 254);
        assert_eq!(NodeLayout::max_keys_count(4096, 256), 15);
    }

    #[test]
    fn test_layout_too_small() {
        assert!(matches!(
            NodeLayout::new(64, 8),
            Err(NodeError::LayoutTooSmall { max_keys: 2, .. })
        ));
        assert!(NodeLayout::new(4096, 0).is_err());
        assert!(NodeLayout::new(4096, 2000).is_err());
        assert_eq!(NodeLayout::new(128, 8).expect("layout").max_keys(), 6);
    }

    #[test]
    fn test_init_clears_page() {
        let page = leaf(7);
        assert!(page.is_leaf());
        assert!(!page.is_root());
        assert_eq!(page.index(), 7);
        assert_eq!(page.keys_count(), 0);
        assert_eq!(page.value(0), 0);
    }

    #[test]
    fn test_leaf_insert_keeps_order() {
        let mut page = leaf(1);
        for key in [50_u64, 10, 40, 20, 30] {
            page.insert(&key, key * 10).expect("insert");
        }

        assert_eq!(keys(&page), vec![10, 20, 30, 40, 50]);
        for i in 0..5 {
            assert_eq!(page.value(i), page.key(i) * 10);
        }
    }

    #[test]
    fn test_duplicates_keep_insertion_order() {
        let mut page = leaf(1);
        page.insert(&5, 1).expect("insert");
        page.insert(&9, 2).expect("insert");
        page.insert(&5, 3).expect("insert");

        assert_eq!(keys(&page), vec![5, 5, 9]);
        assert_eq!(page.value(0), 1);
        assert_eq!(page.value(1), 3);
        assert_eq!(page.value(2), 2);
    }

    #[test]
    fn test_find_is_upper_bound() {
        let mut page = leaf(1);
        for key in [10_u64, 20, 30] {
            page.insert(&key, 0).expect("insert");
        }

        assert_eq!(page.find(&5), 0);
        assert_eq!(page.find(&10), 1);
        assert_eq!(page.find(&15), 1);
        assert_eq!(page.find(&30), 3);
        assert_eq!(page.find(&35), 3);
    }

    #[test]
    fn test_internal_insert_places_right_child() {
        let mut page: BTreePage<Vec<u8>, u64> = BTreePage::new(vec![0; 256], layout());
        page.init(0, false, true);
        page.set_value(0, 100);
        page.insert(&20, 300).expect("insert");
        page.insert(&10, 200).expect("insert");
        page.insert(&30, 400).expect("insert");

        assert_eq!(keys(&page), vec![10, 20, 30]);
        let children: Vec<u64> = (0..=3).map(|i| page.value(i)).collect();
        assert_eq!(children, vec![100, 200, 300, 400]);
    }

    #[test]
    fn test_insert_into_full_page_fails() {
        let mut page = leaf(3);
        for key in 0..14_u64 {
            page.insert(&key, key).expect("insert");
        }
        assert!(page.is_full());

        let result = page.insert(&99, 99);
        assert_eq!(
            result,
            Err(NodeError::PageFull {
                page: 3,
                max_keys: 14
            })
        );
        assert_eq!(page.keys_count(), 14);
    }

    #[test]
    fn test_copy_entries_and_truncate() {
        let mut source = leaf(1);
        for key in 0..14_u64 {
            source.insert(&key, key + 100).expect("insert");
        }

        let mut right = leaf(2);
        right.copy_entries_from(&source, 7..14, 7..14);
        source.truncate(7);

        assert_eq!(keys(&source), (0..7).collect::<Vec<_>>());
        assert_eq!(keys(&right), (7..14).collect::<Vec<_>>());
        assert_eq!(right.value(0), 107);
        assert_eq!(right.value(6), 113);
        assert_eq!(right.index(), 2, "copy leaves the header alone");
    }
}
