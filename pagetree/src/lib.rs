// Embedded ordered indices over paged files.
//
// Layers, bottom up:
//  - storage: backing file, page windows (mmap or buffered), file header
//    and the bounded page cache
//  - btree: page layout, insertion with splits, cursor and checker
//  - counter: append-only records with sequential ids
//
// Keys and records are fixed width; see `codec`.

pub mod btree;
pub mod codec;
pub mod config;
pub mod counter;
pub mod storage;

mod e2e_tests;

pub use btree::{BTree, BTreeError, Cursor};
pub use codec::FixedWidth;
pub use config::{BackingMode, ConfigError, EvictionPolicy, StoreConfig};
pub use counter::Counter;
pub use storage::StorageError;
