//! Page identifiers and little-endian field access over raw page bytes.
//!
//! Pages are plain byte slices handed out by the pager. These helpers read
//! and write the fixed-width integer fields that the header and node layouts
//! are built from.

/// A logical page number (0-indexed; page 0 is the tree root).
pub type PageId = u64;

/// Smallest page size accepted by the configuration.
pub const MIN_PAGE_SIZE: usize = 64;

/// Default page size in bytes (4KB).
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Byte offset of logical page `page_id` in the backing file.
///
/// The first page-sized region of the file holds the file header, so page
/// `i` occupies `[(i + 1) * page_size, (i + 2) * page_size)`.
///
/// Returns `None` if the offset does not fit in a `u64`.
#[must_use]
pub fn page_offset(page_id: PageId, page_size: usize) -> Option<u64> {
    page_id.checked_add(1)?.checked_mul(page_size as u64)
}

/// Read a u8 at the given offset.
#[must_use]
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes[offset]
}

/// Write a u8 at the given offset.
pub fn write_u8(bytes: &mut [u8], offset: usize, value: u8) {
    bytes[offset] = value;
}

/// Read a u16 (little-endian) at the given offset.
#[must_use]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Write a u16 (little-endian) at the given offset.
pub fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Read a u32 (little-endian) at the given offset.
#[must_use]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Write a u32 (little-endian) at the given offset.
pub fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Read a u64 (little-endian) at the given offset.
#[must_use]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
        bytes[offset + 4],
        bytes[offset + 5],
        bytes[offset + 6],
        bytes[offset + 7],
    ])
}

/// Write a u64 (little-endian) at the given offset.
pub fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
