//! Append-only record store with sequential ids.
//!
//! A counter file holds fixed-width records packed densely into pages and
//! hands out ids `1, 2, 3, ...` as records are appended. Record `n` lives in
//! slot `n - 1`, so lookups are a division away. The last id handed out is
//! kept in the file header.
//!
//! Counters are typically paired with one or more [`BTree`](crate::BTree)
//! indices whose values are counter ids.

// Slot offsets are below page_size, which is a usize.
#![allow(clippy::cast_possible_truncation)]

use std::marker::PhantomData;
use std::path::Path;

use crate::codec::FixedWidth;
use crate::config::StoreConfig;
use crate::storage::{PageId, Pager, SUBTYPE_COUNTER, StorageError};

/// Record file minting sequential ids for values of type `V`.
pub struct Counter<V> {
    pager: Pager,
    records_per_page: u64,
    _value: PhantomData<fn() -> V>,
}

impl<V: FixedWidth> Counter<V> {
    /// Open the counter stored at `path`, creating an empty one if needed.
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self, StorageError> {
        config.validate()?;
        if V::WIDTH == 0 || V::WIDTH > config.page_size {
            return Err(StorageError::CapacityExceeded {
                what: "record width must be positive and fit in a page",
                limit: config.page_size as u64,
            });
        }

        let mut pager = Pager::open(path, config, SUBTYPE_COUNTER, V::WIDTH)?;
        if pager.header().must_initialize {
            pager.update_header(|header| header.must_initialize = false);
            tracing::info!(
                path = %path.display(),
                record_width = V::WIDTH,
                "initialised empty counter"
            );
        }

        Ok(Self {
            pager,
            records_per_page: (config.page_size / V::WIDTH) as u64,
            _value: PhantomData,
        })
    }

    /// Number of records appended so far, which is also the last id.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.pager.header().sequence
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `value` under the next id and return that id.
    pub fn append(&mut self, value: &V) -> Result<u64, StorageError> {
        let id = self
            .len()
            .checked_add(1)
            .ok_or(StorageError::CapacityExceeded {
                what: "counter id",
                limit: u64::MAX,
            })?;

        let (page, offset) = self.locate(id);
        while self.pager.page_count() <= page {
            self.pager.allocate_page()?;
        }

        let bytes = self.pager.get_page(page)?;
        value.encode(&mut bytes[offset..offset + V::WIDTH]);
        self.pager.update_header(|header| header.sequence = id);

        Ok(id)
    }

    /// Read the record with `id`, or `None` if no such record was appended.
    pub fn get(&mut self, id: u64) -> Result<Option<V>, StorageError> {
        if id == 0 || id > self.len() {
            return Ok(None);
        }

        let (page, offset) = self.locate(id);
        let bytes = self.pager.get_page(page)?;
        Ok(Some(V::decode(&bytes[offset..offset + V::WIDTH])))
    }

    /// Grow the file ahead of time so that `count` more records fit.
    ///
    /// Returns the resulting file size.
    pub fn reserve(&mut self, count: u64) -> Result<u64, StorageError> {
        let records = self
            .len()
            .checked_add(count)
            .ok_or(StorageError::CapacityExceeded {
                what: "counter id",
                limit: u64::MAX,
            })?;
        self.pager
            .reserve_pages(records.div_ceil(self.records_per_page))
    }

    /// Persist all records and the header.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.pager.flush()
    }

    /// The page cache backing this counter.
    #[must_use]
    pub const fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Page and byte offset of record `id` (1-based).
    const fn locate(&self, id: u64) -> (PageId, usize) {
        let slot = id - 1;
        let page = slot / self.records_per_page;
        let offset = (slot % self.records_per_page) as usize * V::WIDTH;
        (page, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::padded;
    use crate::storage::HeaderError;
    use tempfile::tempdir;

    type Record = ([u8; 8], u64);

    fn record(name: &str, age: u64) -> Record {
        (padded(name.as_bytes()), age)
    }

    // 64 byte pages hold four 16 byte records.
    fn tiny_pages() -> StoreConfig {
        StoreConfig::default()
            .with_page_size(64)
            .with_reserve_size(4096)
            .with_pages_max_count(2)
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let dir = tempdir().expect("create temp dir");
        let mut counter: Counter<Record> =
            Counter::open(&dir.path().join("people.cnt"), StoreConfig::default()).expect("open");

        assert!(counter.is_empty());
        assert_eq!(counter.append(&record("ann", 31)).expect("append"), 1);
        assert_eq!(counter.append(&record("bob", 42)).expect("append"), 2);
        assert_eq!(counter.append(&record("cy", 7)).expect("append"), 3);
        assert_eq!(counter.len(), 3);

        assert_eq!(counter.get(2).expect("get"), Some(record("bob", 42)));
        assert_eq!(counter.get(0).expect("get"), None);
        assert_eq!(counter.get(4).expect("get"), None);
    }

    #[test]
    fn test_records_span_pages_under_eviction() {
        let dir = tempdir().expect("create temp dir");
        let mut counter: Counter<Record> =
            Counter::open(&dir.path().join("people.cnt"), tiny_pages()).expect("open");

        for age in 0..50_u64 {
            let id = counter.append(&record("x", age)).expect("append");
            assert_eq!(id, age + 1);
        }
        assert_eq!(counter.pager().page_count(), 13);
        assert!(counter.pager().cached_pages() <= 2);

        for id in (1..=50_u64).rev() {
            let (_, age) = counter.get(id).expect("get").expect("present");
            assert_eq!(age, id - 1);
        }
    }

    #[test]
    fn test_counter_persists_across_reopen() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("people.cnt");

        {
            let mut counter: Counter<Record> = Counter::open(&path, tiny_pages()).expect("open");
            for age in 0..10_u64 {
                counter.append(&record("y", age)).expect("append");
            }
        }

        let mut counter: Counter<Record> = Counter::open(&path, tiny_pages()).expect("reopen");
        assert_eq!(counter.len(), 10);
        assert_eq!(counter.get(10).expect("get"), Some(record("y", 9)));
        assert_eq!(counter.append(&record("z", 0)).expect("append"), 11);
    }

    #[test]
    fn test_reserve_grows_file() {
        let dir = tempdir().expect("create temp dir");
        let mut counter: Counter<Record> =
            Counter::open(&dir.path().join("people.cnt"), tiny_pages()).expect("open");

        // 1000 records need 250 pages plus the header region.
        let size = counter.reserve(1000).expect("reserve");
        assert!(size >= 251 * 64);
        assert_eq!(size % 4096, 0);
    }

    #[test]
    fn test_rejects_wrong_record_width() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("people.cnt");

        drop(Counter::<Record>::open(&path, tiny_pages()).expect("create"));

        let result = Counter::<u64>::open(&path, tiny_pages());
        assert!(matches!(
            result,
            Err(StorageError::CorruptHeader {
                reason: HeaderError::KeyWidthMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_record_wider_than_page() {
        let dir = tempdir().expect("create temp dir");
        let result = Counter::<[u8; 128]>::open(&dir.path().join("wide.cnt"), tiny_pages());
        assert!(matches!(result, Err(StorageError::CapacityExceeded { .. })));
    }
}
