//! # Event Bus System
//!
//! Event-driven notifications for the sync core using
//! `tokio::sync::broadcast`. The scheduler, sync engine, change watcher and
//! connection pool emit typed events; the route layer and dashboard subscribe
//! to surface live progress without polling the store.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SyncEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Started {
//!         task_id: "task-1".to_string(),
//!         task_name: "movies".to_string(),
//!         drive_id: "drive-1".to_string(),
//!     }))
//!     .ok();
//! ```
//!
//! ## Error Handling
//!
//! Subscribers receive `RecvError::Lagged(n)` when they fall behind (non
//! fatal) and `RecvError::Closed` on shutdown. `emit` fails only when no
//! subscriber exists, which callers treat as a no-op via `.ok()`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync-pass related events
    Sync(SyncEvent),
    /// Change-watcher related events
    Watch(WatchEvent),
    /// Drive / credential related events
    Drive(DriveEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Watch(e) => e.description(),
            CoreEvent::Drive(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Drive(DriveEvent::CredentialInvalid { .. }) => EventSeverity::Error,
            CoreEvent::Watch(WatchEvent::PollFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Started { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted around one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A pass started for a task.
    Started {
        task_id: String,
        task_name: String,
        drive_id: String,
    },
    /// Incremental progress update during traversal.
    Progress {
        task_id: String,
        /// Files scanned so far
        current: u64,
        /// Files discovered so far (grows as folders are found)
        total: u64,
    },
    /// Pass finished successfully.
    Completed {
        task_id: String,
        scanned: u64,
        added: u64,
        updated: u64,
        deleted: u64,
        skipped: u64,
        duration_ms: u64,
    },
    /// Pass aborted with an error.
    Failed { task_id: String, message: String },
    /// Firing skipped because a pass is already in flight.
    Skipped { task_id: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync pass started",
            SyncEvent::Progress { .. } => "Sync pass in progress",
            SyncEvent::Completed { .. } => "Sync pass completed",
            SyncEvent::Failed { .. } => "Sync pass failed",
            SyncEvent::Skipped { .. } => "Sync firing skipped",
        }
    }
}

// ============================================================================
// Watch Events
// ============================================================================

/// Events emitted by the change watcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum WatchEvent {
    /// Relevant remote changes were detected for a drive.
    ChangesDetected {
        drive_id: String,
        /// Number of relevant events in the drained poll
        relevant_events: u64,
        /// Cursor position after the poll
        cursor: i64,
    },
    /// A poll failed; it will be retried at the next interval.
    PollFailed { drive_id: String, message: String },
    /// A drive watcher started.
    WatchStarted { drive_id: String, interval_secs: u64 },
    /// The last watcher for a drive was removed.
    WatchStopped { drive_id: String },
}

impl WatchEvent {
    fn description(&self) -> &str {
        match self {
            WatchEvent::ChangesDetected { .. } => "Remote changes detected",
            WatchEvent::PollFailed { .. } => "Event poll failed",
            WatchEvent::WatchStarted { .. } => "Drive watcher started",
            WatchEvent::WatchStopped { .. } => "Drive watcher stopped",
        }
    }
}

// ============================================================================
// Drive Events
// ============================================================================

/// Events related to drive credential state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DriveEvent {
    /// A pooled client was created and validated for a drive.
    ClientConnected { drive_id: String },
    /// A pooled client was evicted.
    ClientEvicted { drive_id: String },
    /// The drive's credential was rejected; re-authentication is required.
    CredentialInvalid { drive_id: String, message: String },
}

impl DriveEvent {
    fn description(&self) -> &str {
        match self {
            DriveEvent::ClientConnected { .. } => "Drive client connected",
            DriveEvent::ClientEvicted { .. } => "Drive client evicted",
            DriveEvent::CredentialInvalid { .. } => "Drive credential invalid",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for publishing [`CoreEvent`]s.
///
/// Cloning an `EventBus` produces another handle to the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers the event reached. An error means
    /// no subscriber exists; callers treat this as a no-op.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        tracing::trace!(event = %event.description(), "emitting core event");
        self.sender.send(event)
    }

    /// Create a new independent subscription.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let event = CoreEvent::Watch(WatchEvent::ChangesDetected {
            drive_id: "d1".to_string(),
            relevant_events: 3,
            cursor: 42,
        });
        bus.emit(event.clone()).unwrap();

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_an_error() {
        let bus = EventBus::new(8);
        let result = bus.emit(CoreEvent::Sync(SyncEvent::Skipped {
            task_id: "t1".to_string(),
        }));
        assert!(result.is_err());
    }

    #[test]
    fn severity_mapping() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            task_id: "t1".to_string(),
            message: "boom".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let poll_failed = CoreEvent::Watch(WatchEvent::PollFailed {
            drive_id: "d1".to_string(),
            message: "timeout".to_string(),
        });
        assert_eq!(poll_failed.severity(), EventSeverity::Warning);
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = CoreEvent::Drive(DriveEvent::CredentialInvalid {
            drive_id: "d1".to_string(),
            message: "expired".to_string(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Drive\""));
        assert!(json.contains("CredentialInvalid"));
    }
}
