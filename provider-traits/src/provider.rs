//! Cloud Storage Provider Abstraction
//!
//! Defines the capability-polymorphic interface every remote-storage backend
//! implements. The sync core depends only on this trait; the concrete wire
//! protocol (HTTP client, request/response schemas) lives in the backend
//! crates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::EventPage;

/// One entry of a remote directory listing.
///
/// `content_id` is the identifier used to build a playback URL for this file.
/// Backends that cannot produce one up front leave it `None`; such files are
/// resolved lazily through [`CloudProvider::get_download_identifier`] or
/// skipped by the sync engine when resolution fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Backend-assigned stable file/folder id
    pub id: String,
    /// Display name, including extension for files
    pub name: String,
    /// Parent node id, if the backend reports one
    pub parent_id: Option<String>,
    /// Size in bytes (None for folders)
    pub size: Option<u64>,
    /// Whether this entry is a folder
    pub is_folder: bool,
    /// Content identifier used for playback URLs
    pub content_id: Option<String>,
    /// Creation time (Unix seconds)
    pub created_at: Option<i64>,
    /// Last modification time (Unix seconds)
    pub modified_at: Option<i64>,
}

impl RemoteEntry {
    /// Lower-cased extension of the entry name, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// One page of a directory listing.
#[derive(Debug, Clone, Default)]
pub struct FileListing {
    /// Entries in this page
    pub entries: Vec<RemoteEntry>,
    /// Total number of entries under the listed node
    pub total: u64,
}

/// Capability interface over a remote cloud-storage account.
///
/// One implementation per backend; one client instance per authenticated
/// account. Implementations are expected to enforce their own bounded
/// timeouts on every call and surface expiry as
/// [`ProviderError::AuthInvalid`](crate::error::ProviderError::AuthInvalid).
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// List direct children of `node_id`, paginated by `limit`/`offset`.
    ///
    /// `total` in the returned listing covers the whole node, not the page,
    /// so callers can drive their own pagination loop.
    async fn list_files(&self, node_id: &str, limit: u32, offset: u64) -> Result<FileListing>;

    /// Search files by keyword under `node_id` (backend-defined semantics).
    async fn search_files(&self, keyword: &str, node_id: &str) -> Result<Vec<RemoteEntry>>;

    /// Resolve the playback/download identifier for a file.
    async fn get_download_identifier(&self, file_id: &str) -> Result<String>;

    /// Check that the credential behind this client is still accepted.
    ///
    /// Returns `Ok(false)` for a cleanly rejected credential; transport
    /// failures are errors.
    async fn validate_credential(&self) -> Result<bool>;

    /// List change events after `cursor`, at most `limit` per page.
    ///
    /// Events are append-only and monotonically ordered by id. Passing
    /// `cursor = 0` starts from the beginning of retained history.
    async fn get_events(&self, cursor: i64, limit: u32) -> Result<EventPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> RemoteEntry {
        RemoteEntry {
            id: "f1".to_string(),
            name: name.to_string(),
            parent_id: None,
            size: Some(10),
            is_folder: false,
            content_id: Some("c1".to_string()),
            created_at: None,
            modified_at: None,
        }
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(entry("Movie.MKV").extension(), Some("mkv".to_string()));
        assert_eq!(entry("a.b.mp4").extension(), Some("mp4".to_string()));
    }

    #[test]
    fn extension_absent_for_bare_names() {
        assert_eq!(entry("README").extension(), None);
        assert_eq!(entry(".hidden").extension(), None);
        assert_eq!(entry("trailing.").extension(), None);
    }
}
