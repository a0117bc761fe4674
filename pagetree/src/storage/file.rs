//! Backing file handle.
//!
//! Owns the file descriptor of a paged file, tracks its length and grows it
//! in fixed reservation increments. The file never shrinks.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::error::StorageError;

/// An open paged file.
#[derive(Debug)]
pub struct BackingFile {
    path: PathBuf,
    file: File,
    size: u64,
    reserve_size: u64,
}

impl BackingFile {
    /// Open the file at `path` for reading and writing, creating it if absent.
    ///
    /// `reserve_size` is the growth granularity used by [`Self::reserve`].
    pub fn open_or_create(path: &Path, reserve_size: u64) -> Result<Self, StorageError> {
        if reserve_size == 0 {
            return Err(StorageError::CapacityExceeded {
                what: "reserve size must be positive",
                limit: 0,
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StorageError::io(path, "opening", e))?;

        let size = file
            .metadata()
            .map_err(|e| StorageError::io(path, "reading metadata of", e))?
            .len();

        tracing::debug!(path = %path.display(), size, "opened backing file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            reserve_size,
        })
    }

    /// Current length of the file in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying file.
    #[must_use]
    pub const fn file(&self) -> &File {
        &self.file
    }

    /// Grow the file so that it is at least `min_size` bytes long.
    ///
    /// The new length is the smallest multiple of the reservation granularity
    /// that is `>= min_size`. Does nothing if the file is already large enough.
    /// Returns the resulting file size.
    pub fn reserve(&mut self, min_size: u64) -> Result<u64, StorageError> {
        if self.size >= min_size {
            return Ok(self.size);
        }

        let new_size = min_size
            .div_ceil(self.reserve_size)
            .checked_mul(self.reserve_size)
            .ok_or(StorageError::CapacityExceeded {
                what: "file size",
                limit: u64::MAX,
            })?;

        self.file
            .set_len(new_size)
            .map_err(|e| StorageError::io(&self.path, "extending", e))?;

        tracing::debug!(
            path = %self.path.display(),
            from = self.size,
            to = new_size,
            "grew backing file"
        );
        self.size = new_size;

        Ok(new_size)
    }

    /// Fill `buf` with the bytes stored at `offset`.
    ///
    /// The range must lie within the current file size.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| StorageError::io(&self.path, "seeking", e))?;
        self.file
            .read_exact(buf)
            .map_err(|e| StorageError::io(&self.path, "reading", e))
    }

    /// Write `buf` at `offset`, growing the file first if needed.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        self.reserve(offset + buf.len() as u64)?;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| StorageError::io(&self.path, "seeking", e))?;
        self.file
            .write_all(buf)
            .map_err(|e| StorageError::io(&self.path, "writing", e))
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.file
            .sync_all()
            .map_err(|e| StorageError::io(&self.path, "syncing", e))
    }
}
