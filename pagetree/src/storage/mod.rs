//! Paged file storage.
//!
//! Every structure built by this crate lives in a single file divided into
//! fixed-size pages and reached through a bounded page cache.
//!
//! # File Format
//!
//! - Bytes `[0, page_size)`: file header (magic, subtype, version, widths,
//!   counters, checksum)
//! - Page `i`: bytes `[(i + 1) * page_size, (i + 2) * page_size)`
//!
//! The file always grows to a multiple of the configured reservation size.
//!
//! # Usage
//!
//! ```no_run
//! use pagetree::StoreConfig;
//! use pagetree::storage::{Pager, SUBTYPE_BTREE};
//!
//! # fn main() -> Result<(), pagetree::storage::StorageError> {
//! let mut pager = Pager::open("index.bin".as_ref(), StoreConfig::default(), SUBTYPE_BTREE, 8)?;
//! let page = pager.allocate_page()?;
//! pager.get_page(page)?[..5].copy_from_slice(b"hello");
//! pager.flush()?;
//! # Ok(())
//! # }
//! ```

mod error;
mod file;
mod header;
mod mapper;
pub mod page;
mod pager;

pub use error::StorageError;
pub use file::BackingFile;
pub use header::{
    FORMAT_VERSION, FileHeader, FormatVersion, HEADER_LEN, HeaderError, MAGIC, SUBTYPE_BTREE,
    SUBTYPE_COUNTER,
};
pub use mapper::PageMapper;
pub use page::PageId;
pub use pager::Pager;
