//! # Core Configuration Module
//!
//! Builder-constructed configuration for the sync core with fail-fast
//! validation: a missing or nonsensical setting is reported at build time,
//! not at first use.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/strmsync/strmsync.db")
//!     .pool_freshness_secs(300)
//!     .listing_page_size(200)
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Default validity window for pooled clients, in seconds.
pub const DEFAULT_POOL_FRESHNESS_SECS: u64 = 300;

/// Default page size for provider directory listings.
pub const DEFAULT_LISTING_PAGE_SIZE: u32 = 100;

/// Default page size for change-event polls.
pub const DEFAULT_EVENT_PAGE_SIZE: u32 = 100;

/// Lower bound for watcher poll intervals, in seconds.
pub const MIN_WATCH_POLL_SECS: u64 = 10;

/// Core configuration for the sync engine.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// How long a validated pool entry may be reused without re-validation.
    /// Zero forces a validation round trip on every acquire.
    pub pool_freshness_secs: u64,

    /// Page size used when listing remote directories
    pub listing_page_size: u32,

    /// Page size used when polling change events
    pub event_page_size: u32,

    /// Event bus buffer size
    pub event_buffer_size: usize,
}

impl CoreConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    pool_freshness_secs: Option<u64>,
    listing_page_size: Option<u32>,
    event_page_size: Option<u32>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Set the SQLite database path (required).
    pub fn database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the pool freshness window in seconds.
    pub fn pool_freshness_secs(mut self, secs: u64) -> Self {
        self.pool_freshness_secs = Some(secs);
        self
    }

    /// Set the directory-listing page size.
    pub fn listing_page_size(mut self, size: u32) -> Self {
        self.listing_page_size = Some(size);
        self
    }

    /// Set the change-event page size.
    pub fn event_page_size(mut self, size: u32) -> Self {
        self.event_page_size = Some(size);
        self
    }

    /// Set the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the database path is missing or a page
    /// size is zero.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config(
                "database_path is required. Point it at the SQLite file the sync core owns."
                    .to_string(),
            )
        })?;

        let listing_page_size = self.listing_page_size.unwrap_or(DEFAULT_LISTING_PAGE_SIZE);
        if listing_page_size == 0 {
            return Err(Error::Config("listing_page_size must be > 0".to_string()));
        }

        let event_page_size = self.event_page_size.unwrap_or(DEFAULT_EVENT_PAGE_SIZE);
        if event_page_size == 0 {
            return Err(Error::Config("event_page_size must be > 0".to_string()));
        }

        Ok(CoreConfig {
            database_path,
            pool_freshness_secs: self
                .pool_freshness_secs
                .unwrap_or(DEFAULT_POOL_FRESHNESS_SECS),
            listing_page_size,
            event_page_size,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_with_defaults() {
        let config = CoreConfig::builder()
            .database_path("/tmp/strmsync.db")
            .build()
            .unwrap();

        assert_eq!(config.pool_freshness_secs, DEFAULT_POOL_FRESHNESS_SECS);
        assert_eq!(config.listing_page_size, DEFAULT_LISTING_PAGE_SIZE);
        assert_eq!(config.event_page_size, DEFAULT_EVENT_PAGE_SIZE);
    }

    #[test]
    fn missing_database_path_fails() {
        let result = CoreConfig::builder().build();
        assert!(result.is_err());
    }

    #[test]
    fn zero_page_size_fails() {
        let result = CoreConfig::builder()
            .database_path("/tmp/strmsync.db")
            .listing_page_size(0)
            .build();
        assert!(result.is_err());
    }
}
