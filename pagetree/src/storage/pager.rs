//! Bounded page cache over a paged file.
//!
//! The pager maps logical page numbers to windows of the backing file. At
//! most `pages_max_count` pages are bound at once; a miss with every slot
//! occupied evicts one slot chosen by the configured [`EvictionPolicy`].
//!
//! The pager also owns the file header: it creates it for a new file,
//! validates it on reopen and rewrites it whenever a counter changes.
//!
//! # Invariants
//!
//! - `index` maps each bound page to its slot; `slots[index[p]].page == p`
//! - `slots.len() <= config.pages_max_count`
//! - Page `i` occupies file bytes `[(i + 1) * page_size, (i + 2) * page_size)`
//! - The header window is bound for the pager's whole lifetime and is not
//!   counted against `pages_max_count`

use std::collections::HashMap;
use std::path::Path;

use crate::config::{EvictionPolicy, StoreConfig};
use crate::storage::error::StorageError;
use crate::storage::file::BackingFile;
use crate::storage::header::FileHeader;
use crate::storage::mapper::PageMapper;
use crate::storage::page::{PageId, page_offset};

/// One occupied cache slot.
#[derive(Debug)]
struct Slot {
    page: PageId,
    mapper: PageMapper,
    /// Accesses since the page was installed in this slot.
    uses: u64,
    /// Clock tick of the most recent access.
    last_used: u64,
}

/// Page cache for one file.
#[derive(Debug)]
pub struct Pager {
    file: BackingFile,
    config: StoreConfig,
    header: FileHeader,
    header_window: PageMapper,
    slots: Vec<Slot>,
    index: HashMap<PageId, usize>,
    clock: u64,
}

impl Pager {
    /// Open the file at `path`, creating it (and its header) if it is empty.
    ///
    /// An existing file must carry a header with the given `subtype`,
    /// `key_width` and the configured page size.
    pub fn open(
        path: &Path,
        config: StoreConfig,
        subtype: [u8; 4],
        key_width: usize,
    ) -> Result<Self, StorageError> {
        config.validate()?;

        let page_size = u32::try_from(config.page_size).map_err(|_| {
            StorageError::CapacityExceeded {
                what: "page size",
                limit: u64::from(u32::MAX),
            }
        })?;
        let key_width = u32::try_from(key_width).map_err(|_| StorageError::CapacityExceeded {
            what: "key width",
            limit: u64::from(u32::MAX),
        })?;

        let mut file = BackingFile::open_or_create(path, config.reserve_size)?;
        let fresh = file.size() == 0;
        let mut header_window = PageMapper::map(&mut file, 0, config.page_size, config.backing)?;

        let header = if fresh {
            let header = FileHeader::new(subtype, key_width, page_size);
            header.write_to(header_window.bytes_mut());
            header_window.flush(&mut file)?;
            tracing::info!(
                path = %path.display(),
                subtype = %String::from_utf8_lossy(&subtype),
                key_width,
                page_size,
                "initialised file header"
            );
            header
        } else {
            FileHeader::read_from(header_window.bytes())
                .and_then(|header| {
                    header
                        .validate(subtype, key_width, page_size)
                        .map(|()| header)
                })
                .map_err(|reason| StorageError::CorruptHeader {
                    path: path.to_path_buf(),
                    reason,
                })?
        };

        Ok(Self {
            file,
            config,
            header,
            header_window,
            slots: Vec::with_capacity(config.pages_max_count),
            index: HashMap::with_capacity(config.pages_max_count),
            clock: 0,
        })
    }

    /// The current file header.
    #[must_use]
    pub const fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Modify the header and write it back to the header window.
    pub fn update_header(&mut self, update: impl FnOnce(&mut FileHeader)) {
        update(&mut self.header);
        self.header.write_to(self.header_window.bytes_mut());
    }

    /// Number of logical pages in use.
    #[must_use]
    pub const fn page_count(&self) -> u64 {
        self.header.page_count
    }

    /// Current length of the backing file in bytes.
    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.file.size()
    }

    /// Number of pages currently bound.
    #[must_use]
    pub fn cached_pages(&self) -> usize {
        self.slots.len()
    }

    /// Whether `page` is currently bound.
    #[must_use]
    pub fn is_cached(&self, page: PageId) -> bool {
        self.index.contains_key(&page)
    }

    /// Return the bytes of logical page `page`, binding it if needed.
    ///
    /// The slice borrows the pager, so it cannot be held across another
    /// call that might evict it.
    pub fn get_page(&mut self, page: PageId) -> Result<&mut [u8], StorageError> {
        self.clock += 1;

        let slot = match self.index.get(&page) {
            Some(&slot) => slot,
            None => self.install(page)?,
        };

        let entry = &mut self.slots[slot];
        entry.uses += 1;
        entry.last_used = self.clock;
        Ok(entry.mapper.bytes_mut())
    }

    /// Append a new logical page and return its number.
    ///
    /// The page is not bound and its bytes are whatever the file holds
    /// (zeroes for a page that was never written).
    pub fn allocate_page(&mut self) -> Result<PageId, StorageError> {
        let page = self.header.page_count;
        let page_count = page.checked_add(1).ok_or(StorageError::CapacityExceeded {
            what: "page count",
            limit: u64::MAX,
        })?;
        self.update_header(|header| header.page_count = page_count);
        tracing::trace!(page, "allocated page");
        Ok(page)
    }

    /// Grow the backing file so that pages `0..count` fit.
    pub fn reserve_pages(&mut self, count: u64) -> Result<u64, StorageError> {
        let end = page_offset(count, self.config.page_size).ok_or(
            StorageError::CapacityExceeded {
                what: "page offset",
                limit: u64::MAX,
            },
        )?;
        self.file.reserve(end)
    }

    /// Persist every bound page and the header, then sync the file.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        for slot in &self.slots {
            slot.mapper.flush(&mut self.file)?;
        }
        self.header_window.flush(&mut self.file)?;
        self.file.sync()
    }

    /// Bind `page` into a slot, evicting another page if all slots are taken.
    fn install(&mut self, page: PageId) -> Result<usize, StorageError> {
        let offset = page_offset(page, self.config.page_size).ok_or(
            StorageError::CapacityExceeded {
                what: "page offset",
                limit: u64::MAX,
            },
        )?;
        let mapper = PageMapper::map(
            &mut self.file,
            offset,
            self.config.page_size,
            self.config.backing,
        )?;

        if self.slots.len() < self.config.pages_max_count {
            self.slots.push(Slot {
                page,
                mapper,
                uses: 0,
                last_used: 0,
            });
            let slot = self.slots.len() - 1;
            self.index.insert(page, slot);
            return Ok(slot);
        }

        // Both the new mapping and the victim's write-back happen before the
        // slot changes hands; if either fails the cache is left untouched.
        let slot = self.select_victim();
        self.slots[slot].mapper.write_back(&mut self.file)?;
        let victim = std::mem::replace(
            &mut self.slots[slot],
            Slot {
                page,
                mapper,
                uses: 0,
                last_used: 0,
            },
        );
        self.index.remove(&victim.page);
        self.index.insert(page, slot);

        tracing::trace!(
            slot,
            evicted = victim.page,
            uses = victim.uses,
            page,
            "evicted page"
        );
        victim.mapper.unmap();

        Ok(slot)
    }

    fn select_victim(&self) -> usize {
        let slots = self.slots.iter().enumerate();
        let victim = match self.config.eviction {
            EvictionPolicy::LeastUsed => slots.min_by_key(|(_, slot)| slot.uses),
            EvictionPolicy::LeastRecentlyUsed => slots.min_by_key(|(_, slot)| slot.last_used),
        };
        victim.map_or(0, |(slot, _)| slot)
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(
                path = %self.file.path().display(),
                error = %e,
                "failed to flush pages on close"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackingMode;
    use crate::storage::header::{HeaderError, SUBTYPE_BTREE, SUBTYPE_COUNTER};
    use crate::storage::page::{read_u64, write_u64};
    use tempfile::tempdir;

    fn small_config() -> StoreConfig {
        StoreConfig::default()
            .with_page_size(4096)
            .with_reserve_size(64 * 1024)
            .with_pages_max_count(4)
    }

    #[test]
    fn test_new_file_gets_header() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");

        let pager = Pager::open(&path, small_config(), SUBTYPE_BTREE, 8).expect("open");
        assert!(pager.header().must_initialize);
        assert_eq!(pager.header().key_width, 8);
        assert_eq!(pager.header().page_size, 4096);
        assert_eq!(pager.page_count(), 0);
        assert_eq!(pager.file_size(), 64 * 1024);
    }

    #[test]
    fn test_header_changes_persist() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");

        {
            let mut pager = Pager::open(&path, small_config(), SUBTYPE_COUNTER, 16).expect("open");
            pager.update_header(|header| {
                header.must_initialize = false;
                header.sequence = 7;
            });
            assert_eq!(pager.allocate_page().expect("allocate"), 0);
            assert_eq!(pager.allocate_page().expect("allocate"), 1);
        }

        let pager = Pager::open(&path, small_config(), SUBTYPE_COUNTER, 16).expect("reopen");
        assert!(!pager.header().must_initialize);
        assert_eq!(pager.header().sequence, 7);
        assert_eq!(pager.page_count(), 2);
    }

    #[test]
    fn test_reopen_rejects_incompatible_file() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");

        drop(Pager::open(&path, small_config(), SUBTYPE_BTREE, 8).expect("create"));

        let result = Pager::open(&path, small_config(), SUBTYPE_BTREE, 16);
        assert!(matches!(
            result,
            Err(StorageError::CorruptHeader {
                reason: HeaderError::KeyWidthMismatch { .. },
                ..
            })
        ));

        let result = Pager::open(&path, small_config(), SUBTYPE_COUNTER, 8);
        assert!(matches!(
            result,
            Err(StorageError::CorruptHeader {
                reason: HeaderError::WrongSubtype { .. },
                ..
            })
        ));

        let result = Pager::open(
            &path,
            small_config().with_page_size(8192),
            SUBTYPE_BTREE,
            8,
        );
        assert!(matches!(result, Err(StorageError::CorruptHeader { .. })));
    }

    #[test]
    fn test_reopen_rejects_foreign_file() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");
        std::fs::write(&path, vec![0x5Au8; 8192]).expect("write foreign file");

        let result = Pager::open(&path, small_config(), SUBTYPE_BTREE, 8);
        assert!(matches!(
            result,
            Err(StorageError::CorruptHeader {
                reason: HeaderError::InvalidMagic(_),
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");

        let result = Pager::open(
            &path,
            small_config().with_pages_max_count(0),
            SUBTYPE_BTREE,
            8,
        );
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[test]
    fn test_buffered_victim_written_before_reuse() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");
        let config = small_config().with_backing(BackingMode::Buffered);

        let mut pager = Pager::open(&path, config, SUBTYPE_BTREE, 8).expect("open");
        write_u64(pager.get_page(0).expect("get page"), 0, 0xDEAD_BEEF);
        for page in 1..4 {
            pager.get_page(page).expect("get page");
        }

        let on_disk = std::fs::read(&path).expect("read file");
        assert_eq!(read_u64(&on_disk, 4096), 0, "still only in memory");

        // All slots are taken and page 0 is the lowest tied slot.
        pager.get_page(4).expect("get page");
        assert!(!pager.is_cached(0));

        let on_disk = std::fs::read(&path).expect("read file");
        assert_eq!(read_u64(&on_disk, 4096), 0xDEAD_BEEF);
    }

    fn round_robin(eviction: EvictionPolicy, backing: BackingMode) {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");
        let config = small_config().with_eviction(eviction).with_backing(backing);
        let pages: u64 = 11;

        let mut pager = Pager::open(&path, config, SUBTYPE_BTREE, 8).expect("open");
        for page in 0..pages {
            let bytes = pager.get_page(page).expect("get page");
            write_u64(bytes, 0, page * 1000);
            write_u64(bytes, 4088, page);
        }
        assert!(pager.cached_pages() <= 4);

        for round in 1..=3u64 {
            for page in 0..pages {
                let bytes = pager.get_page(page).expect("get page");
                assert_eq!(read_u64(bytes, 0), page * 1000 + round - 1);
                assert_eq!(read_u64(bytes, 4088), page);
                write_u64(bytes, 0, page * 1000 + round);
            }
            assert!(pager.cached_pages() <= 4);
        }
        drop(pager);

        let mut pager = Pager::open(&path, config, SUBTYPE_BTREE, 8).expect("reopen");
        for page in 0..pages {
            let bytes = pager.get_page(page).expect("get page");
            assert_eq!(read_u64(bytes, 0), page * 1000 + 3);
        }
    }

    #[test]
    fn test_round_robin_least_used_mapped() {
        round_robin(EvictionPolicy::LeastUsed, BackingMode::Mapped);
    }

    #[test]
    fn test_round_robin_least_used_buffered() {
        round_robin(EvictionPolicy::LeastUsed, BackingMode::Buffered);
    }

    #[test]
    fn test_round_robin_lru_mapped() {
        round_robin(EvictionPolicy::LeastRecentlyUsed, BackingMode::Mapped);
    }

    #[test]
    fn test_round_robin_lru_buffered() {
        round_robin(EvictionPolicy::LeastRecentlyUsed, BackingMode::Buffered);
    }

    #[test]
    fn test_least_used_keeps_hot_page() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");
        let config = small_config().with_pages_max_count(2);

        let mut pager = Pager::open(&path, config, SUBTYPE_BTREE, 8).expect("open");
        for _ in 0..3 {
            pager.get_page(0).expect("get page");
        }
        pager.get_page(1).expect("get page");
        pager.get_page(2).expect("get page");

        assert!(pager.is_cached(0), "page 0 has the most uses");
        assert!(!pager.is_cached(1));
        assert!(pager.is_cached(2));
    }

    #[test]
    fn test_lru_evicts_oldest_access() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");
        let config = small_config()
            .with_pages_max_count(2)
            .with_eviction(EvictionPolicy::LeastRecentlyUsed);

        let mut pager = Pager::open(&path, config, SUBTYPE_BTREE, 8).expect("open");
        for _ in 0..3 {
            pager.get_page(0).expect("get page");
        }
        pager.get_page(1).expect("get page");
        pager.get_page(2).expect("get page");

        assert!(!pager.is_cached(0), "page 0 was touched longest ago");
        assert!(pager.is_cached(1));
        assert!(pager.is_cached(2));
    }

    #[test]
    fn test_least_used_ties_go_to_lowest_slot() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");
        let config = small_config().with_pages_max_count(3);

        let mut pager = Pager::open(&path, config, SUBTYPE_BTREE, 8).expect("open");
        pager.get_page(5).expect("get page");
        pager.get_page(6).expect("get page");
        pager.get_page(7).expect("get page");
        pager.get_page(8).expect("get page");

        assert!(!pager.is_cached(5));
        assert!(pager.is_cached(6));
        assert!(pager.is_cached(7));
        assert!(pager.is_cached(8));
    }

    #[test]
    fn test_reserve_pages_grows_file() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.idx");

        let mut pager = Pager::open(&path, small_config(), SUBTYPE_BTREE, 8).expect("open");
        let size = pager.reserve_pages(100).expect("reserve");
        assert!(size >= 101 * 4096);
        assert_eq!(size % (64 * 1024), 0);
        assert_eq!(pager.file_size(), size);
    }
}
