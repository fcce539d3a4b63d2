//! Run log persistence.

use crate::models::{LogCounters, RunLog, RunLogId, RunStatus, TaskId};
use crate::{Result, StoreError};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

/// Repository trait for run log persistence
#[async_trait]
pub trait RunLogRepository: Send + Sync {
    /// Insert a new log entry
    async fn insert(&self, log: &RunLog) -> Result<()>;

    /// Update an existing log entry
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the entry doesn't exist.
    async fn update(&self, log: &RunLog) -> Result<()>;

    /// Find a log entry by id
    async fn find_by_id(&self, id: &RunLogId) -> Result<Option<RunLog>>;

    /// Get run history of a task, most recent first
    async fn get_history(&self, task_id: &TaskId, limit: u32) -> Result<Vec<RunLog>>;

    /// Get the most recent log entry of a task
    async fn find_latest(&self, task_id: &TaskId) -> Result<Option<RunLog>>;

    /// Delete log entries of a task older than the newest `keep` entries
    async fn prune(&self, task_id: &TaskId, keep: u32) -> Result<u64>;
}

/// SQLite implementation of RunLogRepository
pub struct SqliteRunLogRepository {
    pool: SqlitePool,
}

impl SqliteRunLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RunLogRow {
    id: String,
    task_id: String,
    started_at: i64,
    finished_at: Option<i64>,
    duration_ms: Option<i64>,
    status: String,
    message: Option<String>,
    error_detail: Option<String>,
    scanned: i64,
    added: i64,
    updated: i64,
    deleted: i64,
    skipped: i64,
}

impl TryFrom<RunLogRow> for RunLog {
    type Error = StoreError;

    fn try_from(row: RunLogRow) -> Result<Self> {
        let status: RunStatus = row.status.parse()?;

        Ok(RunLog {
            id: RunLogId::from_string(&row.id)?,
            task_id: TaskId::from_string(&row.task_id)?,
            started_at: row.started_at,
            finished_at: row.finished_at,
            duration_ms: row.duration_ms,
            status,
            message: row.message,
            error_detail: row.error_detail,
            counters: LogCounters {
                scanned: row.scanned,
                added: row.added,
                updated: row.updated,
                deleted: row.deleted,
                skipped: row.skipped,
            },
        })
    }
}

const LOG_COLUMNS: &str = "id, task_id, started_at, finished_at, duration_ms, status, \
     message, error_detail, scanned, added, updated, deleted, skipped";

#[async_trait]
impl RunLogRepository for SqliteRunLogRepository {
    async fn insert(&self, log: &RunLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_logs (
                id, task_id, started_at, finished_at, duration_ms, status,
                message, error_detail, scanned, added, updated, deleted, skipped
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.task_id.as_str())
        .bind(log.started_at)
        .bind(log.finished_at)
        .bind(log.duration_ms)
        .bind(log.status.as_str())
        .bind(&log.message)
        .bind(&log.error_detail)
        .bind(log.counters.scanned)
        .bind(log.counters.added)
        .bind(log.counters.updated)
        .bind(log.counters.deleted)
        .bind(log.counters.skipped)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, log: &RunLog) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE run_logs SET
                finished_at = ?,
                duration_ms = ?,
                status = ?,
                message = ?,
                error_detail = ?,
                scanned = ?,
                added = ?,
                updated = ?,
                deleted = ?,
                skipped = ?
            WHERE id = ?
            "#,
        )
        .bind(log.finished_at)
        .bind(log.duration_ms)
        .bind(log.status.as_str())
        .bind(&log.message)
        .bind(&log.error_detail)
        .bind(log.counters.scanned)
        .bind(log.counters.added)
        .bind(log.counters.updated)
        .bind(log.counters.deleted)
        .bind(log.counters.skipped)
        .bind(log.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("run log", log.id.to_string()));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &RunLogId) -> Result<Option<RunLog>> {
        let row = sqlx::query_as::<_, RunLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM run_logs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RunLog::try_from).transpose()
    }

    async fn get_history(&self, task_id: &TaskId, limit: u32) -> Result<Vec<RunLog>> {
        let rows = sqlx::query_as::<_, RunLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM run_logs \
             WHERE task_id = ? ORDER BY started_at DESC LIMIT ?"
        ))
        .bind(task_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(RunLog::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn find_latest(&self, task_id: &TaskId) -> Result<Option<RunLog>> {
        let row = sqlx::query_as::<_, RunLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM run_logs \
             WHERE task_id = ? ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(task_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RunLog::try_from).transpose()
    }

    async fn prune(&self, task_id: &TaskId, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM run_logs WHERE task_id = ? AND id NOT IN (
                SELECT id FROM run_logs WHERE task_id = ?
                ORDER BY started_at DESC LIMIT ?
            )
            "#,
        )
        .bind(task_id.as_str())
        .bind(task_id.as_str())
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
