//! # Core Store
//!
//! SQLite-backed persistence for the sync core: drives, sync tasks, strm
//! records, run logs, and watch cursors.
//!
//! ## Architecture
//!
//! - [`db`] owns the connection pool, pragmas, and embedded migrations
//! - [`models`] are plain entities with their state-machine helpers
//! - [`repositories`] expose async traits with SQLite implementations, so
//!   higher layers depend on the traits and tests can swap in mocks
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pool = core_store::create_pool(DatabaseConfig::new("sync.db")).await?;
//! let tasks = SqliteTaskRepository::new(pool.clone());
//! ```

pub mod db;
mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use sqlx::SqlitePool;
pub use error::{Result, StoreError};
pub use models::{
    Drive, FileFilter, IntervalUnit, LogCounters, RecordStatus, RunLog, RunLogId, RunStatus,
    ScheduleKind, StrmRecord, SyncTask, TaskId, TaskProgress, TaskStatus, WatchConfig,
    AUDIO_EXTENSIONS, VIDEO_EXTENSIONS,
};
pub use repositories::{
    DriveRepository, RecordRepository, RunLogRepository, SqliteDriveRepository,
    SqliteRecordRepository, SqliteRunLogRepository, SqliteTaskRepository,
    SqliteWatchCursorRepository, TaskRepository, WatchCursorRepository,
};
