//! Test that files are only reopened by a compatible owner.

use std::fs;
use std::path::Path;

use crate::e2e_tests::helpers::*;
use crate::storage::{FileHeader, FormatVersion, HEADER_LEN, HeaderError};
use crate::{BTree, BTreeError, Counter, FixedWidth, StorageError, StoreConfig};

fn create_tree(path: &Path, config: StoreConfig) {
    let mut tree: BTree<u64> = BTree::open(path, config).expect("create");
    for key in 0..100 {
        tree.insert(&key, key).expect("insert");
    }
    tree.flush().expect("flush");
}

fn open_error<K: FixedWidth + Ord>(path: &Path, config: StoreConfig) -> HeaderError {
    match BTree::<K>::open(path, config) {
        Err(BTreeError::Storage(StorageError::CorruptHeader { reason, .. })) => reason,
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("incompatible file was accepted"),
    }
}

fn rewrite_header(path: &Path, update: impl FnOnce(&mut FileHeader)) {
    let mut bytes = fs::read(path).expect("read file");
    let mut header = FileHeader::read_from(&bytes).expect("parse header");
    update(&mut header);
    header.write_to(&mut bytes[..HEADER_LEN]);
    fs::write(path, bytes).expect("write file");
}

#[test]
fn test_key_width_mismatch() {
    let dir = TestDir::new();
    let path = dir.path("width.idx");
    create_tree(&path, small_pages());

    assert_eq!(
        open_error::<[u8; 16]>(&path, small_pages()),
        HeaderError::KeyWidthMismatch {
            expected: 16,
            found: 8
        }
    );
}

#[test]
fn test_page_size_mismatch() {
    let dir = TestDir::new();
    let path = dir.path("pages.idx");
    create_tree(&path, StoreConfig::default());

    assert_eq!(
        open_error::<u64>(&path, small_pages()),
        HeaderError::PageSizeMismatch {
            expected: 256,
            found: 4096
        }
    );
}

#[test]
fn test_counter_file_is_not_a_tree() {
    let dir = TestDir::new();
    let path = dir.path("records.cnt");
    {
        let mut counter: Counter<u64> = Counter::open(&path, small_pages()).expect("create");
        counter.append(&7).expect("append");
    }

    assert!(matches!(
        open_error::<u64>(&path, small_pages()),
        HeaderError::WrongSubtype { .. }
    ));
}

#[test]
fn test_tree_file_is_not_a_counter() {
    let dir = TestDir::new();
    let path = dir.path("tree.idx");
    create_tree(&path, small_pages());

    let result = Counter::<u64>::open(&path, small_pages());
    assert!(matches!(
        result,
        Err(StorageError::CorruptHeader {
            reason: HeaderError::WrongSubtype { .. },
            ..
        })
    ));
}

#[test]
fn test_corrupted_header_byte() {
    let dir = TestDir::new();
    let path = dir.path("corrupt.idx");
    create_tree(&path, small_pages());

    let mut bytes = fs::read(&path).expect("read file");
    bytes[30] ^= 0x5A;
    fs::write(&path, bytes).expect("write file");

    assert!(matches!(
        open_error::<u64>(&path, small_pages()),
        HeaderError::ChecksumMismatch { .. }
    ));
}

#[test]
fn test_older_format_version() {
    let dir = TestDir::new();
    let path = dir.path("old.idx");
    create_tree(&path, small_pages());

    let old = FormatVersion {
        major: 0,
        minor: 0,
        release: 9,
    };
    rewrite_header(&path, |header| header.version = old);

    assert_eq!(
        open_error::<u64>(&path, small_pages()),
        HeaderError::UnsupportedVersion(old)
    );
}

#[test]
fn test_foreign_file() {
    let dir = TestDir::new();
    let path = dir.path("notes.txt");
    fs::write(&path, b"hello, this is not an index").expect("write file");

    assert_eq!(
        open_error::<u64>(&path, small_pages()),
        HeaderError::InvalidMagic(*b"hell")
    );
}

#[test]
fn test_rejected_file_is_left_intact() {
    let dir = TestDir::new();
    let path = dir.path("intact.idx");
    create_tree(&path, small_pages());
    let before = fs::read(&path).expect("read file");

    open_error::<u32>(&path, small_pages());

    assert_eq!(fs::read(&path).expect("read file"), before);
    let mut tree: BTree<u64> = BTree::open(&path, small_pages()).expect("reopen");
    assert_eq!(tree.get(&42).expect("get"), Some(42));
}
