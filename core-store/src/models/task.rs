//! Sync task entity and its embedded definitions.
//!
//! A task binds one drive to one remote subtree and describes how that
//! subtree is mirrored into pointer files: filtering, path layout, schedule,
//! and watch configuration. The scheduler mutates run counters and status on
//! every execution; the engine updates progress incrementally.

use super::current_timestamp;
use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Default video extensions recognized when `include_video` is set.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "ts", "m2ts", "rmvb", "webm", "mpg", "mpeg", "vob",
    "3gp",
];

/// Default audio extensions recognized when `include_audio` is set.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "aac", "ogg", "m4a", "wma", "ape", "alac", "opus",
];

// ============================================================================
// ID Type
// ============================================================================

/// Unique identifier for a sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new random task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a task ID from a string
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(Uuid::parse_str(s).map_err(|e| {
            StoreError::invalid("task_id", e.to_string())
        })?))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Task status, reflecting the most recent or in-flight execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Never run, or reset
    Idle,
    /// Firing accepted, pass not yet started
    Pending,
    /// A reconciliation pass is in flight
    Running,
    /// Last pass completed successfully
    Success,
    /// Last pass failed
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(TaskStatus::Idle),
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "error" => Ok(TaskStatus::Error),
            _ => Err(StoreError::invalid("status", s)),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Schedule Definition
// ============================================================================

/// Unit for interval schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    /// Multiplier to seconds.
    pub fn as_secs(&self) -> u64 {
        match self {
            IntervalUnit::Seconds => 1,
            IntervalUnit::Minutes => 60,
            IntervalUnit::Hours => 3600,
            IntervalUnit::Days => 86400,
        }
    }
}

/// Schedule definition for a task.
///
/// Serialized as JSON into the `schedule` column; the scheduler computes
/// concrete fire times from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScheduleKind {
    /// Never fired by the timer; manual runs only
    Disabled,
    /// Fire every `value` units
    Interval { value: u32, unit: IntervalUnit },
    /// Standard 5-field cron expression (minute hour dom month dow)
    Cron { expr: String },
}

impl ScheduleKind {
    /// Whether the timer should drive this task at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ScheduleKind::Disabled)
    }

    /// Interval length in seconds, for interval schedules.
    pub fn interval_secs(&self) -> Option<u64> {
        match self {
            ScheduleKind::Interval { value, unit } => Some(u64::from(*value) * unit.as_secs()),
            _ => None,
        }
    }
}

impl Default for ScheduleKind {
    fn default() -> Self {
        ScheduleKind::Disabled
    }
}

/// Change-watch configuration for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Whether this task subscribes to remote change events
    pub enabled: bool,
    /// Desired poll interval; the effective per-drive interval is the
    /// minimum across all watching tasks
    pub poll_interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: 300,
        }
    }
}

// ============================================================================
// File Filter
// ============================================================================

/// File-type filter for a task.
///
/// A non-empty custom extension list fully replaces the defaults; otherwise
/// the default video/audio sets apply per the include flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub include_video: bool,
    pub include_audio: bool,
    /// Lower-cased extensions without leading dot
    pub custom_extensions: Vec<String>,
}

impl FileFilter {
    /// Whether a file with the given lower-cased extension qualifies.
    pub fn matches(&self, extension: &str) -> bool {
        if !self.custom_extensions.is_empty() {
            return self.custom_extensions.iter().any(|e| e == extension);
        }
        if self.include_video && VIDEO_EXTENSIONS.contains(&extension) {
            return true;
        }
        if self.include_audio && AUDIO_EXTENSIONS.contains(&extension) {
            return true;
        }
        false
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            include_video: true,
            include_audio: false,
            custom_extensions: Vec::new(),
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Live progress of the current pass.
///
/// `total_files` accumulates lazily: it grows as subfolders are discovered
/// during traversal rather than being pre-counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Files scanned so far in the current pass
    pub current_file_index: u64,
    /// Files discovered so far in the current pass
    pub total_files: u64,
}

// ============================================================================
// Sync Task Entity
// ============================================================================

/// A synchronization job bound to exactly one drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: TaskId,
    pub name: String,
    /// Owning drive
    pub drive_id: String,
    /// Remote subtree root node id
    pub source_node_id: String,
    /// Local directory the pointer files land in
    pub output_dir: String,
    /// Base URL joined into generated pointer contents
    pub base_url: String,
    pub filter: FileFilter,
    /// Mirror the remote relative path under `output_dir`; flat otherwise
    pub preserve_structure: bool,
    /// Mark records deleted when their remote file disappears
    pub delete_orphans: bool,
    /// Rewrite pointer files even when unchanged
    pub overwrite_strm: bool,
    /// Also remove the pointer file from disk when a record is orphaned
    pub delete_strm_files: bool,
    pub schedule: ScheduleKind,
    pub watch: WatchConfig,
    /// Total completed executions
    pub total_runs: u64,
    /// Total pointer files ever generated by this task
    pub total_strm_generated: u64,
    pub last_run_at: Option<i64>,
    pub last_run_status: Option<TaskStatus>,
    pub last_run_message: Option<String>,
    pub progress: TaskProgress,
    pub status: TaskStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SyncTask {
    /// Create a new idle task with default flags.
    pub fn new(
        name: impl Into<String>,
        drive_id: impl Into<String>,
        source_node_id: impl Into<String>,
        output_dir: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let now = current_timestamp();
        Self {
            id: TaskId::new(),
            name: name.into(),
            drive_id: drive_id.into(),
            source_node_id: source_node_id.into(),
            output_dir: output_dir.into(),
            base_url: base_url.into(),
            filter: FileFilter::default(),
            preserve_structure: true,
            delete_orphans: false,
            overwrite_strm: false,
            delete_strm_files: false,
            schedule: ScheduleKind::Disabled,
            watch: WatchConfig::default(),
            total_runs: 0,
            total_strm_generated: 0,
            last_run_at: None,
            last_run_status: None,
            last_run_message: None,
            progress: TaskProgress::default(),
            status: TaskStatus::Idle,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the outcome of a finished execution.
    pub fn record_run(&mut self, status: TaskStatus, message: impl Into<String>, generated: u64) {
        let now = current_timestamp();
        self.total_runs += 1;
        self.total_strm_generated += generated;
        self.last_run_at = Some(now);
        self.last_run_status = Some(status);
        self.last_run_message = Some(message.into());
        self.status = status;
        self.updated_at = now;
    }
}
