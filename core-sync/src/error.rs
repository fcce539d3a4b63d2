//! Error types for the sync orchestration layer.

use provider_traits::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Credential rejected or expired. The pool entry is evicted and the
    /// task is marked error; no retry until the next trigger.
    #[error("Credential invalid: {0}")]
    AuthInvalid(String),

    /// Network or timeout failure talking to the backend. Retried on the
    /// next scheduled firing, no pool eviction.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Store error: {0}")]
    Store(#[from] core_store::StoreError),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Task {task_id} is already running")]
    AlreadyRunning { task_id: String },

    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: String },

    #[error("Drive {drive_id} not found")]
    DriveNotFound { drive_id: String },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}

impl SyncError {
    /// Whether this error means the drive needs re-authentication.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::AuthInvalid(_))
    }
}

impl From<ProviderError> for SyncError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::AuthInvalid(msg) => SyncError::AuthInvalid(msg),
            other => SyncError::ProviderUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
