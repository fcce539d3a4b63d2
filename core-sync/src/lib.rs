//! # Core Sync
//!
//! The synchronization-and-orchestration engine: pooled provider clients,
//! timer- and cron-driven scheduling with single-flight execution, cursor
//! based change watching, and the tree-diff reconciliation that turns a
//! remote media tree into local `.strm` pointer files.
//!
//! ## Architecture
//!
//! - [`pool`]: one validated provider client per drive, shared across tasks
//! - [`schedule`]: fire-time computation for interval and cron schedules
//! - [`scheduler`]: soonest-wake driver loop plus manual runs
//! - [`watcher`]: ref-counted per-drive change pollers with durable cursors
//! - [`engine`]: the reconciliation pass itself
//! - [`service`]: wires everything into one [`SyncCore`] handle
//!
//! Control flow: a scheduler firing acquires a pool bundle for the task's
//! drive, runs one engine pass, persists a run log and the task's run
//! snapshot, and releases the bundle for reuse. The watcher runs
//! independently and funnels relevant remote changes into the same
//! single-flight execution path.

pub mod engine;
mod error;
pub mod pool;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod watcher;

pub use engine::{SyncEngine, PLAYBACK_PATH_SEGMENT, STRM_EXTENSION};
pub use error::{Result, SyncError};
pub use pool::{ClientBundle, ConnectionPool};
pub use schedule::{next_fire_time, validate_schedule};
pub use scheduler::{SchedulerStatus, SyncScheduler};
pub use service::SyncCore;
pub use watcher::{ChangeCallback, ChangeWatcher};
