//! Page windows over the backing file.
//!
//! A [`PageMapper`] binds a fixed-size read/write window to a byte range of
//! the backing file. Two strategies sit behind the same interface:
//!
//! - `Mapped`: a shared memory map of the range. Writes go straight to the
//!   file's pages in the OS page cache.
//! - `Buffered`: a zero-initialised heap buffer loaded from the file when the
//!   window is bound. Its contents reach the file only through
//!   [`PageMapper::write_back`] or [`PageMapper::flush`]. This avoids
//!   creating many small mappings.
//!
//! Releasing a window is split in two: a fallible `write_back`, then an
//! infallible `unmap`.
//!
//! Several mappers may be live at once as long as their ranges are disjoint.

use memmap2::{MmapMut, MmapOptions};

use crate::config::BackingMode;
use crate::storage::error::StorageError;
use crate::storage::file::BackingFile;

/// A bound window of `len` bytes at `offset` in the backing file.
#[derive(Debug)]
pub struct PageMapper {
    offset: u64,
    window: Window,
}

#[derive(Debug)]
enum Window {
    Mapped(MmapMut),
    Buffered(Box<[u8]>),
}

impl PageMapper {
    /// Bind a window of `len` bytes at `offset`.
    ///
    /// The file is grown first if it does not cover the requested range.
    pub fn map(
        file: &mut BackingFile,
        offset: u64,
        len: usize,
        mode: BackingMode,
    ) -> Result<Self, StorageError> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(StorageError::CapacityExceeded {
                what: "mapped range end",
                limit: u64::MAX,
            })?;
        file.reserve(end)?;

        let window = match mode {
            BackingMode::Mapped => Window::Mapped(map_shared(file, offset, len)?),
            BackingMode::Buffered => {
                let mut buffer = vec![0u8; len].into_boxed_slice();
                file.read_at(offset, &mut buffer)?;
                Window::Buffered(buffer)
            }
        };

        Ok(Self { offset, window })
    }

    /// Byte offset of the window in the file.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// The window's bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match &self.window {
            Window::Mapped(map) => map,
            Window::Buffered(buffer) => buffer,
        }
    }

    /// Mutable access to the window's bytes.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.window {
            Window::Mapped(map) => map,
            Window::Buffered(buffer) => buffer,
        }
    }

    /// Persist the window's contents without releasing it.
    pub fn flush(&self, file: &mut BackingFile) -> Result<(), StorageError> {
        match &self.window {
            Window::Mapped(map) => map
                .flush()
                .map_err(|e| StorageError::io(file.path(), "flushing mapped page of", e)),
            Window::Buffered(buffer) => file.write_at(self.offset, buffer),
        }
    }

    /// Hand the window's contents to the file so that it can be released.
    ///
    /// Buffered windows are written to the file. Mapped windows already share
    /// the file's pages and are left to the OS to write back, without a sync.
    pub fn write_back(&self, file: &mut BackingFile) -> Result<(), StorageError> {
        match &self.window {
            Window::Mapped(_) => Ok(()),
            Window::Buffered(buffer) => file.write_at(self.offset, buffer),
        }
    }

    /// Release the window. Buffered contents that were not written back are
    /// discarded.
    pub fn unmap(self) {
        drop(self.window);
    }
}

#[allow(unsafe_code)]
fn map_shared(file: &BackingFile, offset: u64, len: usize) -> Result<MmapMut, StorageError> {
    // SAFETY: MmapOptions::map_mut is unsafe because the mapped file may be
    // modified or truncated by another process. This is sound here because:
    // 1. The file is opened read/write by this process and never truncated
    //    (BackingFile only grows it)
    // 2. The range [offset, offset + len) was reserved just before mapping
    // 3. Each pager slot owns its window and ranges of live windows are disjoint
    unsafe {
        MmapOptions::new()
            .offset(offset)
            .len(len)
            .map_mut(file.file())
            .map_err(|e| StorageError::io(file.path(), "mapping page of", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &tempfile::TempDir) -> BackingFile {
        BackingFile::open_or_create(&dir.path().join("test.idx"), 64 * 1024).expect("open")
    }

    #[test]
    fn test_map_reserves_file() {
        let dir = tempdir().expect("create temp dir");
        let mut file = open(&dir);

        let mapper = PageMapper::map(&mut file, 4096 * 20, 4096, BackingMode::Mapped).expect("map");
        assert_eq!(mapper.bytes().len(), 4096);
        assert_eq!(mapper.offset(), 4096 * 20);
        assert!(file.size() >= 4096 * 21);
        assert_eq!(file.size() % (64 * 1024), 0);
    }

    #[test]
    fn test_mapped_writes_reach_file() {
        let dir = tempdir().expect("create temp dir");
        let mut file = open(&dir);

        let mut mapper = PageMapper::map(&mut file, 8192, 4096, BackingMode::Mapped).expect("map");
        mapper.bytes_mut()[..5].copy_from_slice(b"hello");
        mapper.write_back(&mut file).expect("write back");
        mapper.unmap();

        let mut buf = [0u8; 5];
        file.read_at(8192, &mut buf).expect("read");
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_buffered_window_round_trip() {
        let dir = tempdir().expect("create temp dir");
        let mut file = open(&dir);

        let mut mapper =
            PageMapper::map(&mut file, 4096, 4096, BackingMode::Buffered).expect("map");
        assert!(mapper.bytes().iter().all(|&b| b == 0));
        mapper.bytes_mut()[100] = 0xAB;

        let unwritten =
            PageMapper::map(&mut file, 4096, 4096, BackingMode::Buffered).expect("map");
        assert_eq!(unwritten.bytes()[100], 0, "buffered writes stay in memory");

        mapper.write_back(&mut file).expect("write back");
        mapper.unmap();

        let mapper = PageMapper::map(&mut file, 4096, 4096, BackingMode::Buffered).expect("remap");
        assert_eq!(mapper.bytes()[100], 0xAB);
    }

    #[test]
    fn test_disjoint_windows_coexist() {
        let dir = tempdir().expect("create temp dir");
        let mut file = open(&dir);

        let mut first = PageMapper::map(&mut file, 0, 4096, BackingMode::Mapped).expect("map");
        let mut second = PageMapper::map(&mut file, 4096, 4096, BackingMode::Mapped).expect("map");
        first.bytes_mut()[0] = 1;
        second.bytes_mut()[0] = 2;

        assert_eq!(first.bytes()[0], 1);
        assert_eq!(second.bytes()[0], 2);
    }
}
