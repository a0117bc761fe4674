//! Storage configuration.
//!
//! Every file opened by the engine (trees and counters) is described by a
//! [`StoreConfig`]. Defaults suit small embedded indices; a process can also
//! load the configuration from environment variables.
//!
//! # Environment Variables
//!
//! - `PAGETREE_PAGE_SIZE`: Page size in bytes (default: `4096`)
//! - `PAGETREE_RESERVE_SIZE`: File growth granularity in bytes (default: `1048576`)
//! - `PAGETREE_CACHE_PAGES`: Maximum number of simultaneously mapped pages (default: `16`)
//! - `PAGETREE_EVICTION`: `least-used` or `lru` (default: `least-used`)
//! - `PAGETREE_BACKING`: `mmap` or `buffered` (default: `mmap`)
//!
//! # Invariants
//!
//! After `validate()` succeeds:
//! - `page_size >= MIN_PAGE_SIZE` and is a multiple of `MIN_PAGE_SIZE`
//! - `reserve_size >= page_size`
//! - `pages_max_count >= 1`

use std::str::FromStr;

use crate::storage::page::{DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};

/// Policy used by the pager to pick the mapped page to evict on a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Evict the slot with the smallest cumulative use count since it was
    /// installed. Ties go to the lowest slot. This approximates frequency, so
    /// a page that was just installed is the first candidate for eviction.
    #[default]
    LeastUsed,
    /// Evict the slot whose last access is the oldest.
    LeastRecentlyUsed,
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "least-used" | "lfu" => Ok(Self::LeastUsed),
            "lru" | "least-recently-used" => Ok(Self::LeastRecentlyUsed),
            other => Err(format!("'{other}' is not an eviction policy (least-used, lru)")),
        }
    }
}

/// How page windows are bound to the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackingMode {
    /// Shared memory map of the page's byte range.
    #[default]
    Mapped,
    /// Heap buffer loaded on map and written back on eviction or flush.
    Buffered,
}

impl FromStr for BackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mmap" | "mapped" => Ok(Self::Mapped),
            "buffered" | "heap" => Ok(Self::Buffered),
            other => Err(format!("'{other}' is not a backing mode (mmap, buffered)")),
        }
    }
}

/// Configuration shared by every paged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Size of one page (and of the header region) in bytes.
    pub page_size: usize,
    /// The file always grows to a multiple of this many bytes.
    pub reserve_size: u64,
    /// Upper bound on simultaneously mapped pages (the header is not counted).
    pub pages_max_count: usize,
    /// Eviction policy used once all slots are occupied.
    pub eviction: EvictionPolicy,
    /// Memory map or heap buffer per page.
    pub backing: BackingMode,
}

/// Error returned when loading or validating configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: Self::DEFAULT_PAGE_SIZE,
            reserve_size: Self::DEFAULT_RESERVE_SIZE,
            pages_max_count: Self::DEFAULT_PAGES_MAX_COUNT,
            eviction: EvictionPolicy::default(),
            backing: BackingMode::default(),
        }
    }
}

impl StoreConfig {
    /// Default page size.
    pub const DEFAULT_PAGE_SIZE: usize = DEFAULT_PAGE_SIZE;
    /// Default file growth granularity (1 MiB).
    pub const DEFAULT_RESERVE_SIZE: u64 = 1024 * 1024;
    /// Default number of mapped pages.
    pub const DEFAULT_PAGES_MAX_COUNT: usize = 16;

    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to the defaults. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or if the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            page_size: load_var("PAGETREE_PAGE_SIZE", defaults.page_size)?,
            reserve_size: load_var("PAGETREE_RESERVE_SIZE", defaults.reserve_size)?,
            pages_max_count: load_var("PAGETREE_CACHE_PAGES", defaults.pages_max_count)?,
            eviction: load_var("PAGETREE_EVICTION", defaults.eviction)?,
            backing: load_var("PAGETREE_BACKING", defaults.backing)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the file growth granularity.
    #[must_use]
    pub const fn with_reserve_size(mut self, reserve_size: u64) -> Self {
        self.reserve_size = reserve_size;
        self
    }

    /// Set the number of pages that may be mapped at once.
    #[must_use]
    pub const fn with_pages_max_count(mut self, pages_max_count: usize) -> Self {
        self.pages_max_count = pages_max_count;
        self
    }

    /// Set the eviction policy.
    #[must_use]
    pub const fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Set the backing mode.
    #[must_use]
    pub const fn with_backing(mut self, backing: BackingMode) -> Self {
        self.backing = backing;
        self
    }

    /// Check the invariants listed in the module documentation.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size < MIN_PAGE_SIZE || self.page_size % MIN_PAGE_SIZE != 0 {
            return Err(ConfigError::InvalidValue {
                name: "page_size".to_string(),
                message: format!(
                    "{} must be a multiple of {MIN_PAGE_SIZE} and at least {MIN_PAGE_SIZE}",
                    self.page_size
                ),
            });
        }

        if self.reserve_size < self.page_size as u64 {
            return Err(ConfigError::InvalidValue {
                name: "reserve_size".to_string(),
                message: format!(
                    "{} must not be smaller than page_size ({})",
                    self.reserve_size, self.page_size
                ),
            });
        }

        if self.pages_max_count == 0 {
            return Err(ConfigError::InvalidValue {
                name: "pages_max_count".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Load and parse an environment variable, returning `default` when unset.
fn load_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}': {e}"),
            }),
        Err(_) => Ok(default),
    }
}
