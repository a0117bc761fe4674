//! Errors raised by the paged storage layer.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::storage::header::HeaderError;

/// Errors that can occur while opening, growing or mapping a paged file.
#[derive(Debug)]
pub enum StorageError {
    /// An operating system call on the backing file failed.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
    },
    /// The file header is not one this engine can open.
    CorruptHeader { path: PathBuf, reason: HeaderError },
    /// A size or count would exceed what the format can address.
    CapacityExceeded { what: &'static str, limit: u64 },
    /// The configuration is invalid.
    Config(ConfigError),
}

impl StorageError {
    /// Build an `Io` error for `operation` on `path`.
    pub(crate) fn io(path: &std::path::Path, operation: &'static str, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            operation,
            source,
        }
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io {
                path,
                operation,
                source,
            } => write!(f, "I/O error while {operation} '{}': {source}", path.display()),
            Self::CorruptHeader { path, reason } => {
                write!(f, "invalid header in '{}': {reason}", path.display())
            }
            Self::CapacityExceeded { what, limit } => {
                write!(f, "capacity exceeded: {what} (limit {limit})")
            }
            Self::Config(e) => write!(f, "configuration error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::CorruptHeader { reason, .. } => Some(reason),
            Self::Config(e) => Some(e),
            Self::CapacityExceeded { .. } => None,
        }
    }
}

impl From<ConfigError> for StorageError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let e = StorageError::io(
            std::path::Path::new("/tmp/x.idx"),
            "extending",
            std::io::Error::other("disk full"),
        );
        let text = e.to_string();
        assert!(text.contains("extending"));
        assert!(text.contains("/tmp/x.idx"));
        assert!(text.contains("disk full"));

        let e = StorageError::CapacityExceeded {
            what: "page offset",
            limit: u64::MAX,
        };
        assert!(e.to_string().contains("page offset"));
    }
}
