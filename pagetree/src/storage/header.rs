//! File header structure and serialization.
//!
//! The header occupies the first page-sized region of every paged file. It
//! identifies the file format and the kind of structure stored in it, and
//! carries the few counters that must survive a reopen.

use crate::storage::page::{
    read_u8, read_u16, read_u32, read_u64, write_u8, write_u16, write_u32, write_u64,
};

/// Magic tag identifying a pagetree file: "PGTR"
pub const MAGIC: [u8; 4] = *b"PGTR";

/// Subtype tag of B+Tree files.
pub const SUBTYPE_BTREE: [u8; 4] = *b"BTR+";

/// Subtype tag of counter files.
pub const SUBTYPE_COUNTER: [u8; 4] = *b"CNTR";

/// Version written into new files. Files with an older version are refused.
pub const FORMAT_VERSION: FormatVersion = FormatVersion {
    major: 0,
    minor: 1,
    release: 0,
};

/// Number of header bytes in use, checksum included.
pub const HEADER_LEN: usize = offsets::CHECKSUM + 4;

/// Header field offsets.
mod offsets {
    pub const MAGIC: usize = 0;
    pub const SUBTYPE: usize = 4;
    pub const VERSION_MAJOR: usize = 8;
    pub const VERSION_MINOR: usize = 9;
    pub const VERSION_RELEASE: usize = 10;
    pub const KEY_WIDTH: usize = 12;
    pub const PAGE_SIZE: usize = 16;
    pub const MUST_INITIALIZE: usize = 20;
    // 21-23: reserved
    pub const PAGE_COUNT: usize = 24;
    pub const SEQUENCE: usize = 32;
    pub const CHECKSUM: usize = 40;
}

/// Format version, compared field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatVersion {
    pub major: u8,
    pub minor: u8,
    pub release: u16,
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.release)
    }
}

/// Metadata stored at the start of a paged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Kind of structure stored in the file.
    pub subtype: [u8; 4],
    /// Version of the engine that created the file.
    pub version: FormatVersion,
    /// Width of one key (trees) or record (counters) in bytes.
    pub key_width: u32,
    /// Page size in bytes.
    pub page_size: u32,
    /// Set on creation; cleared once the owner has laid out its first page.
    pub must_initialize: bool,
    /// Number of logical pages in use.
    pub page_count: u64,
    /// Last id handed out by a counter. Always 0 for trees.
    pub sequence: u64,
}

impl FileHeader {
    /// Create the header of a fresh file.
    #[must_use]
    pub const fn new(subtype: [u8; 4], key_width: u32, page_size: u32) -> Self {
        Self {
            subtype,
            version: FORMAT_VERSION,
            key_width,
            page_size,
            must_initialize: true,
            page_count: 0,
            sequence: 0,
        }
    }

    /// Serialize the header into the start of `bytes`, checksum included.
    ///
    /// `bytes` must be at least [`HEADER_LEN`] long.
    pub fn write_to(&self, bytes: &mut [u8]) {
        bytes[offsets::MAGIC..offsets::MAGIC + 4].copy_from_slice(&MAGIC);
        bytes[offsets::SUBTYPE..offsets::SUBTYPE + 4].copy_from_slice(&self.subtype);
        write_u8(bytes, offsets::VERSION_MAJOR, self.version.major);
        write_u8(bytes, offsets::VERSION_MINOR, self.version.minor);
        write_u16(bytes, offsets::VERSION_RELEASE, self.version.release);
        write_u32(bytes, offsets::KEY_WIDTH, self.key_width);
        write_u32(bytes, offsets::PAGE_SIZE, self.page_size);
        write_u8(bytes, offsets::MUST_INITIALIZE, u8::from(self.must_initialize));
        bytes[offsets::MUST_INITIALIZE + 1..offsets::PAGE_COUNT].fill(0);
        write_u64(bytes, offsets::PAGE_COUNT, self.page_count);
        write_u64(bytes, offsets::SEQUENCE, self.sequence);

        let checksum = crc32fast::hash(&bytes[..offsets::CHECKSUM]);
        write_u32(bytes, offsets::CHECKSUM, checksum);
    }

    /// Deserialize a header, checking the magic tag and the checksum.
    ///
    /// Compatibility with the caller is checked separately by
    /// [`Self::validate`].
    pub fn read_from(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_LEN {
            return Err(HeaderError::Truncated(bytes.len()));
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[offsets::MAGIC..offsets::MAGIC + 4]);
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }

        let stored = read_u32(bytes, offsets::CHECKSUM);
        let computed = crc32fast::hash(&bytes[..offsets::CHECKSUM]);
        if stored != computed {
            return Err(HeaderError::ChecksumMismatch { stored, computed });
        }

        let mut subtype = [0u8; 4];
        subtype.copy_from_slice(&bytes[offsets::SUBTYPE..offsets::SUBTYPE + 4]);

        Ok(Self {
            subtype,
            version: FormatVersion {
                major: read_u8(bytes, offsets::VERSION_MAJOR),
                minor: read_u8(bytes, offsets::VERSION_MINOR),
                release: read_u16(bytes, offsets::VERSION_RELEASE),
            },
            key_width: read_u32(bytes, offsets::KEY_WIDTH),
            page_size: read_u32(bytes, offsets::PAGE_SIZE),
            must_initialize: read_u8(bytes, offsets::MUST_INITIALIZE) != 0,
            page_count: read_u64(bytes, offsets::PAGE_COUNT),
            sequence: read_u64(bytes, offsets::SEQUENCE),
        })
    }

    /// Check that this header describes a file the caller can open.
    pub fn validate(
        &self,
        subtype: [u8; 4],
        key_width: u32,
        page_size: u32,
    ) -> Result<(), HeaderError> {
        if self.subtype != subtype {
            return Err(HeaderError::WrongSubtype {
                expected: subtype,
                found: self.subtype,
            });
        }
        if self.version < FORMAT_VERSION {
            return Err(HeaderError::UnsupportedVersion(self.version));
        }
        if self.key_width != key_width {
            return Err(HeaderError::KeyWidthMismatch {
                expected: key_width,
                found: self.key_width,
            });
        }
        if self.page_size != page_size {
            return Err(HeaderError::PageSizeMismatch {
                expected: page_size,
                found: self.page_size,
            });
        }
        Ok(())
    }
}

/// Errors that can occur when reading a file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Fewer bytes than a header needs.
    Truncated(usize),
    /// Invalid magic tag.
    InvalidMagic([u8; 4]),
    /// The stored checksum does not match the header bytes.
    ChecksumMismatch { stored: u32, computed: u32 },
    /// The file holds a different kind of structure.
    WrongSubtype { expected: [u8; 4], found: [u8; 4] },
    /// The file was written by an older, incompatible version.
    UnsupportedVersion(FormatVersion),
    /// The file was created with a different key or record width.
    KeyWidthMismatch { expected: u32, found: u32 },
    /// The file was created with a different page size.
    PageSizeMismatch { expected: u32, found: u32 },
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated(len) => write!(f, "header truncated to {len} bytes"),
            Self::InvalidMagic(magic) => {
                write!(f, "invalid magic tag: {:?}", String::from_utf8_lossy(magic))
            }
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            ),
            Self::WrongSubtype { expected, found } => write!(
                f,
                "wrong subtype: expected {:?}, found {:?}",
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(found)
            ),
            Self::UnsupportedVersion(v) => {
                write!(f, "unsupported format version {v} (need {FORMAT_VERSION} or newer)")
            }
            Self::KeyWidthMismatch { expected, found } => {
                write!(f, "key width mismatch: expected {expected}, found {found}")
            }
            Self::PageSizeMismatch { expected, found } => {
                write!(f, "page size mismatch: expected {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for HeaderError {}
