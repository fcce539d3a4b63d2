//! Remote Change Events
//!
//! Types for the polling-based change-notification protocol. The remote event
//! log is append-only and monotonically ordered by id; the watcher keeps a
//! persisted cursor and classifies each event as relevant (content changed)
//! or irrelevant (passive browsing) via the fixed table in
//! [`EventKind::is_relevant`].

use serde::{Deserialize, Serialize};

/// Classification of a remote change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// File uploaded/created
    FileCreate,
    /// File moved between folders
    FileMove,
    /// File received from a share
    FileReceive,
    /// Folder created
    FolderCreate,
    /// Folder copied in
    FolderCopy,
    /// Folder renamed
    FolderRename,
    /// File or folder deleted
    Delete,
    /// Passive browse/open style event
    Browse,
    /// Anything the backend reports that has no mapping
    Other,
}

impl EventKind {
    /// Whether an event of this kind can change the mirrored tree.
    ///
    /// Browse-type and unmapped events never trigger a resync.
    pub fn is_relevant(&self) -> bool {
        matches!(
            self,
            EventKind::FileCreate
                | EventKind::FileMove
                | EventKind::FileReceive
                | EventKind::FolderCreate
                | EventKind::FolderCopy
                | EventKind::FolderRename
                | EventKind::Delete
        )
    }
}

/// One entry of the remote change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Monotonically increasing event id
    pub id: i64,
    /// Classified event kind
    pub kind: EventKind,
    /// File or folder the event refers to, when the backend reports it
    pub file_id: Option<String>,
    /// Display name of the affected entry
    pub file_name: Option<String>,
    /// Event time (Unix seconds)
    pub occurred_at: Option<i64>,
}

/// One page of the change log.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    /// Events in this page, ordered by ascending id
    pub events: Vec<ChangeEvent>,
    /// Cursor to request the next page with
    pub next_cursor: i64,
    /// Whether more pages remain after this one
    pub has_more: bool,
}

impl EventPage {
    /// Highest event id in this page, if any.
    pub fn max_event_id(&self) -> Option<i64> {
        self.events.iter().map(|e| e.id).max()
    }

    /// Whether any event in this page is relevant.
    pub fn any_relevant(&self) -> bool {
        self.events.iter().any(|e| e.kind.is_relevant())
    }
}
