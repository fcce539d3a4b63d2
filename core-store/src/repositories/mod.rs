//! Repository traits and their SQLite implementations.

mod cursor;
mod drive;
mod record;
mod run_log;
mod task;

pub use cursor::{SqliteWatchCursorRepository, WatchCursorRepository};
pub use drive::{DriveRepository, SqliteDriveRepository};
pub use record::{RecordRepository, SqliteRecordRepository};
pub use run_log::{RunLogRepository, SqliteRunLogRepository};
pub use task::{SqliteTaskRepository, TaskRepository};
