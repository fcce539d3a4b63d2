//! Drive entity: one authenticated remote-storage account.

use super::current_timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated remote-storage account.
///
/// `credential_ref` is an opaque reference to where the credential blob is
/// stored (keychain key, file path); the contents never pass through the
/// core. At most one drive carries `is_current = true`, enforced by
/// [`DriveRepository::set_current`](crate::repositories::DriveRepository::set_current).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drive {
    /// Stable opaque id
    pub id: String,
    /// Display name shown in the dashboard
    pub display_name: String,
    /// Backend type tag, resolved through the provider registry
    pub backend: String,
    /// Opaque credential blob location; None until authentication completes
    pub credential_ref: Option<String>,
    /// Whether this is the currently selected drive
    pub is_current: bool,
    /// Creation time (Unix seconds)
    pub created_at: i64,
    /// Last time a pooled client for this drive was used
    pub last_used_at: Option<i64>,
}

impl Drive {
    /// Create a new drive with a generated id and no credential attached.
    pub fn new(display_name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            backend: backend.into(),
            credential_ref: None,
            is_current: false,
            created_at: current_timestamp(),
            last_used_at: None,
        }
    }

    /// Whether a credential reference is attached.
    pub fn has_credential(&self) -> bool {
        self.credential_ref
            .as_deref()
            .is_some_and(|r| !r.is_empty())
    }
}
