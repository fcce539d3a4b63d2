//! Strm record entity: the persisted link between one remote file and its
//! generated pointer file.

use super::{current_timestamp, TaskId};
use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// The remote file was observed in the latest pass
    Active,
    /// Orphaned or explicitly removed
    Deleted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "active" => Ok(RecordStatus::Active),
            "deleted" => Ok(RecordStatus::Deleted),
            _ => Err(StoreError::invalid("record status", s)),
        }
    }
}

/// One persisted mapping from a remote file to a generated pointer file.
///
/// For a given task, at most one record per remote file id is `Active` at a
/// time (enforced by a partial unique index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrmRecord {
    pub id: String,
    pub task_id: TaskId,
    /// Remote file id the record tracks
    pub file_id: String,
    /// Content identifier baked into the playback URL
    pub content_id: String,
    pub file_name: String,
    pub size: i64,
    /// Path of the file inside the remote subtree
    pub remote_path: String,
    /// Absolute path of the generated pointer file
    pub strm_path: String,
    /// Pointer file contents (the playback URL)
    pub strm_content: String,
    pub status: RecordStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StrmRecord {
    /// Create a new active record.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: TaskId,
        file_id: impl Into<String>,
        content_id: impl Into<String>,
        file_name: impl Into<String>,
        size: i64,
        remote_path: impl Into<String>,
        strm_path: impl Into<String>,
        strm_content: impl Into<String>,
    ) -> Self {
        let now = current_timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            task_id,
            file_id: file_id.into(),
            content_id: content_id.into(),
            file_name: file_name.into(),
            size,
            remote_path: remote_path.into(),
            strm_path: strm_path.into(),
            strm_content: strm_content.into(),
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh the identifying data after the remote file changed.
    pub fn refresh(
        &mut self,
        content_id: impl Into<String>,
        strm_path: impl Into<String>,
        strm_content: impl Into<String>,
        size: i64,
    ) {
        self.content_id = content_id.into();
        self.strm_path = strm_path.into();
        self.strm_content = strm_content.into();
        self.size = size;
        self.updated_at = current_timestamp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_status_roundtrip() {
        assert_eq!(
            "active".parse::<RecordStatus>().unwrap(),
            RecordStatus::Active
        );
        assert_eq!(
            "DELETED".parse::<RecordStatus>().unwrap(),
            RecordStatus::Deleted
        );
        assert!("gone".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn refresh_updates_identifying_data() {
        let mut record = StrmRecord::new(
            TaskId::new(),
            "f1",
            "c1",
            "movie.mkv",
            1024,
            "a/movie.mkv",
            "/out/a/movie.strm",
            "http://host/play/c1",
        );
        let created = record.updated_at;

        record.refresh("c2", "/out/a/movie.strm", "http://host/play/c2", 2048);
        assert_eq!(record.content_id, "c2");
        assert_eq!(record.size, 2048);
        assert!(record.updated_at >= created);
        assert_eq!(record.status, RecordStatus::Active);
    }
}
