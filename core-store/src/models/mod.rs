//! Persistent entities of the sync core.

mod drive;
mod record;
mod run_log;
mod task;

pub use drive::Drive;
pub use record::{RecordStatus, StrmRecord};
pub use run_log::{LogCounters, RunLog, RunLogId, RunStatus};
pub use task::{
    FileFilter, IntervalUnit, ScheduleKind, SyncTask, TaskId, TaskProgress, TaskStatus,
    WatchConfig, AUDIO_EXTENSIONS, VIDEO_EXTENSIONS,
};

/// Get current Unix timestamp in seconds.
pub(crate) fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Get current Unix timestamp in milliseconds.
pub(crate) fn current_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
