//! # Connection Pool
//!
//! One lazily-created, validity-checked provider client per drive, shared
//! across concurrent task executions. Acquisition re-validates stale entries
//! so auth expiry never silently serves dead access; an entry found invalid
//! is destroyed and recreated before it is handed out again.
//!
//! The mutex guards only map mutation. Credential validation and client
//! construction happen outside the lock so one slow drive never blocks
//! acquisition for unrelated drives. Two concurrent acquires for the same
//! drive may therefore both build a client; the later map insert wins and
//! the loser is simply dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use core_runtime::events::{CoreEvent, DriveEvent, EventBus};
use core_store::DriveRepository;
use provider_traits::{CloudProvider, ProviderRegistry};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

/// A validated provider client handed out by the pool.
#[derive(Clone)]
pub struct ClientBundle {
    pub drive_id: String,
    pub client: Arc<dyn CloudProvider>,
}

impl std::fmt::Debug for ClientBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBundle")
            .field("drive_id", &self.drive_id)
            .finish_non_exhaustive()
    }
}

struct PoolEntry {
    client: Arc<dyn CloudProvider>,
    last_validated: Instant,
}

/// Per-drive provider client cache.
///
/// Construct one pool per process and share it behind an `Arc` between the
/// scheduler, the change watcher, and the route layer.
pub struct ConnectionPool {
    registry: Arc<ProviderRegistry>,
    drives: Arc<dyn DriveRepository>,
    entries: Mutex<HashMap<String, PoolEntry>>,
    /// How long a validated entry may be reused without re-validation
    freshness: Duration,
    event_bus: EventBus,
}

impl ConnectionPool {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        drives: Arc<dyn DriveRepository>,
        freshness_secs: u64,
        event_bus: EventBus,
    ) -> Self {
        Self {
            registry,
            drives,
            entries: Mutex::new(HashMap::new()),
            freshness: Duration::from_secs(freshness_secs),
            event_bus,
        }
    }

    /// Get a validated client for a drive, creating one if needed.
    ///
    /// # Errors
    ///
    /// - [`SyncError::DriveNotFound`] when the drive doesn't exist
    /// - [`SyncError::AuthInvalid`] when no credential is attached or the
    ///   credential is rejected even after recreation
    /// - [`SyncError::ProviderUnavailable`] on transport failures, which
    ///   leave any cached entry in place
    pub async fn acquire(&self, drive_id: &str) -> Result<ClientBundle> {
        let cached = {
            let entries = self.entries.lock().await;
            entries
                .get(drive_id)
                .map(|e| (Arc::clone(&e.client), e.last_validated))
        };

        if let Some((client, last_validated)) = cached {
            if last_validated.elapsed() < self.freshness {
                self.drives.touch_last_used(drive_id).await.ok();
                return Ok(ClientBundle {
                    drive_id: drive_id.to_string(),
                    client,
                });
            }

            // Stale entry: re-validate outside the lock.
            match client.validate_credential().await {
                Ok(true) => {
                    debug!(drive_id, "pool entry re-validated");
                    let mut entries = self.entries.lock().await;
                    if let Some(entry) = entries.get_mut(drive_id) {
                        entry.last_validated = Instant::now();
                    }
                    self.drives.touch_last_used(drive_id).await.ok();
                    return Ok(ClientBundle {
                        drive_id: drive_id.to_string(),
                        client,
                    });
                }
                Ok(false) => {
                    warn!(drive_id, "pooled client credential rejected, evicting");
                    self.evict(drive_id).await;
                    // Fall through to creation with a fresh client.
                }
                Err(err) if err.is_auth() => {
                    warn!(drive_id, error = %err, "pooled client auth expired, evicting");
                    self.evict(drive_id).await;
                }
                Err(err) => {
                    // Transport failure: keep the entry, report unavailable.
                    return Err(SyncError::ProviderUnavailable(err.to_string()));
                }
            }
        }

        self.create_entry(drive_id).await
    }

    /// Return a bundle to the pool. Entries are shared, not checked out
    /// exclusively, so this only updates usage bookkeeping.
    pub async fn release(&self, drive_id: &str) {
        self.drives.touch_last_used(drive_id).await.ok();
    }

    /// Drop the cached client for a drive.
    pub async fn evict(&self, drive_id: &str) {
        let removed = {
            let mut entries = self.entries.lock().await;
            entries.remove(drive_id)
        };
        if removed.is_some() {
            info!(drive_id, "evicted pooled client");
            self.event_bus
                .emit(CoreEvent::Drive(DriveEvent::ClientEvicted {
                    drive_id: drive_id.to_string(),
                }))
                .ok();
        }
    }

    /// Drop every cached client. Called on shutdown.
    pub async fn evict_all(&self) {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        if count > 0 {
            info!(count, "evicted all pooled clients");
        }
    }

    /// Number of live entries, for diagnostics.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn create_entry(&self, drive_id: &str) -> Result<ClientBundle> {
        let drive = self
            .drives
            .find_by_id(drive_id)
            .await?
            .ok_or_else(|| SyncError::DriveNotFound {
                drive_id: drive_id.to_string(),
            })?;

        let credential_ref = drive.credential_ref.as_deref().filter(|r| !r.is_empty());
        let credential_ref = credential_ref.ok_or_else(|| {
            SyncError::AuthInvalid(format!("drive {drive_id} has no credential attached"))
        })?;

        let client = self.registry.create(&drive.backend, credential_ref)?;

        match client.validate_credential().await {
            Ok(true) => {}
            Ok(false) => {
                let err = SyncError::AuthInvalid(format!(
                    "credential for drive {drive_id} was rejected"
                ));
                self.event_bus
                    .emit(CoreEvent::Drive(DriveEvent::CredentialInvalid {
                        drive_id: drive_id.to_string(),
                        message: err.to_string(),
                    }))
                    .ok();
                return Err(err);
            }
            Err(err) => return Err(err.into()),
        }

        info!(drive_id, backend = %drive.backend, "created pooled client");
        {
            let mut entries = self.entries.lock().await;
            entries.insert(
                drive_id.to_string(),
                PoolEntry {
                    client: Arc::clone(&client),
                    last_validated: Instant::now(),
                },
            );
        }
        self.event_bus
            .emit(CoreEvent::Drive(DriveEvent::ClientConnected {
                drive_id: drive_id.to_string(),
            }))
            .ok();
        self.drives.touch_last_used(drive_id).await.ok();

        Ok(ClientBundle {
            drive_id: drive_id.to_string(),
            client,
        })
    }
}
