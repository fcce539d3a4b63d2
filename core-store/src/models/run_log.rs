//! Run log entity: one execution attempt of a sync task.

use super::{current_timestamp_ms, TaskId};
use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunLogId(Uuid);

impl RunLogId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| StoreError::invalid("run log id", s))
    }
}

impl Default for RunLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Still executing
    Pending,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending)
    }
}

impl FromStr for RunStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            _ => Err(StoreError::invalid("run status", s)),
        }
    }
}

/// Per-run file counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCounters {
    /// Remote files observed during traversal
    pub scanned: i64,
    /// Pointer files newly created
    pub added: i64,
    /// Pointer files rewritten for changed remote files
    pub updated: i64,
    /// Orphaned records marked deleted
    pub deleted: i64,
    /// Files seen but left untouched
    pub skipped: i64,
}

impl LogCounters {
    /// Number of pointer files generated this run (new plus rewritten).
    pub fn generated(&self) -> i64 {
        self.added + self.updated
    }
}

/// One execution attempt of a sync task.
///
/// A log is created `Pending` when the run starts and finalized exactly once
/// via [`finish`](Self::finish) or [`fail`](Self::fail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLog {
    pub id: RunLogId,
    pub task_id: TaskId,
    /// Start time (Unix milliseconds)
    pub started_at: i64,
    /// Finish time (Unix milliseconds); None while pending
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub status: RunStatus,
    /// Short human-readable summary
    pub message: Option<String>,
    /// Full error chain on failure
    pub error_detail: Option<String>,
    pub counters: LogCounters,
}

impl RunLog {
    /// Open a new pending log for a run that is starting now.
    pub fn begin(task_id: TaskId) -> Self {
        Self {
            id: RunLogId::new(),
            task_id,
            started_at: current_timestamp_ms(),
            finished_at: None,
            duration_ms: None,
            status: RunStatus::Pending,
            message: None,
            error_detail: None,
            counters: LogCounters::default(),
        }
    }

    /// Mark the run successful with its final counters.
    pub fn finish(&mut self, counters: LogCounters) -> Result<()> {
        self.finalize(RunStatus::Success)?;
        self.counters = counters;
        self.message = Some(format!(
            "scanned {}, added {}, updated {}, deleted {}, skipped {}",
            counters.scanned, counters.added, counters.updated, counters.deleted, counters.skipped
        ));
        Ok(())
    }

    /// Mark the run failed, keeping whatever counters accumulated so far.
    pub fn fail(
        &mut self,
        message: impl Into<String>,
        detail: Option<String>,
        counters: LogCounters,
    ) -> Result<()> {
        self.finalize(RunStatus::Error)?;
        self.counters = counters;
        self.message = Some(message.into());
        self.error_detail = detail;
        Ok(())
    }

    fn finalize(&mut self, status: RunStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }
        let now = current_timestamp_ms();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).max(0));
        Ok(())
    }
}
