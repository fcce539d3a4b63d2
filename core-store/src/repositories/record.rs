//! Strm record persistence.

use crate::models::{current_timestamp, RecordStatus, StrmRecord, TaskId};
use crate::{Result, StoreError};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

/// Repository trait for strm record persistence
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Insert a new record
    async fn insert(&self, record: &StrmRecord) -> Result<()>;

    /// Update an existing record
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record doesn't exist.
    async fn update(&self, record: &StrmRecord) -> Result<()>;

    /// Find the active record tracking a remote file within a task
    async fn find_active_by_file(
        &self,
        task_id: &TaskId,
        file_id: &str,
    ) -> Result<Option<StrmRecord>>;

    /// List all active records of a task
    async fn find_active_by_task(&self, task_id: &TaskId) -> Result<Vec<StrmRecord>>;

    /// List all records of a task regardless of status
    async fn find_by_task(&self, task_id: &TaskId) -> Result<Vec<StrmRecord>>;

    /// Mark a record deleted, keeping the row for history
    async fn mark_deleted(&self, id: &str) -> Result<()>;

    /// Count active records of a task
    async fn count_active(&self, task_id: &TaskId) -> Result<u64>;
}

/// SQLite implementation of RecordRepository
pub struct SqliteRecordRepository {
    pool: SqlitePool,
}

impl SqliteRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RecordRow {
    id: String,
    task_id: String,
    file_id: String,
    content_id: String,
    file_name: String,
    size: i64,
    remote_path: String,
    strm_path: String,
    strm_content: String,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<RecordRow> for StrmRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self> {
        Ok(StrmRecord {
            id: row.id,
            task_id: TaskId::from_string(&row.task_id)?,
            file_id: row.file_id,
            content_id: row.content_id,
            file_name: row.file_name,
            size: row.size,
            remote_path: row.remote_path,
            strm_path: row.strm_path,
            strm_content: row.strm_content,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const RECORD_COLUMNS: &str = "id, task_id, file_id, content_id, file_name, size, \
     remote_path, strm_path, strm_content, status, created_at, updated_at";

#[async_trait]
impl RecordRepository for SqliteRecordRepository {
    async fn insert(&self, record: &StrmRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO strm_records (
                id, task_id, file_id, content_id, file_name, size,
                remote_path, strm_path, strm_content, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.task_id.as_str())
        .bind(&record.file_id)
        .bind(&record.content_id)
        .bind(&record.file_name)
        .bind(record.size)
        .bind(&record.remote_path)
        .bind(&record.strm_path)
        .bind(&record.strm_content)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, record: &StrmRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE strm_records SET
                content_id = ?,
                file_name = ?,
                size = ?,
                remote_path = ?,
                strm_path = ?,
                strm_content = ?,
                status = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.content_id)
        .bind(&record.file_name)
        .bind(record.size)
        .bind(&record.remote_path)
        .bind(&record.strm_path)
        .bind(&record.strm_content)
        .bind(record.status.as_str())
        .bind(record.updated_at)
        .bind(&record.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("record", &record.id));
        }

        Ok(())
    }

    async fn find_active_by_file(
        &self,
        task_id: &TaskId,
        file_id: &str,
    ) -> Result<Option<StrmRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM strm_records \
             WHERE task_id = ? AND file_id = ? AND status = 'active'"
        ))
        .bind(task_id.as_str())
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StrmRecord::try_from).transpose()
    }

    async fn find_active_by_task(&self, task_id: &TaskId) -> Result<Vec<StrmRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM strm_records \
             WHERE task_id = ? AND status = 'active' ORDER BY remote_path"
        ))
        .bind(task_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(StrmRecord::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn find_by_task(&self, task_id: &TaskId) -> Result<Vec<StrmRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM strm_records \
             WHERE task_id = ? ORDER BY remote_path"
        ))
        .bind(task_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(StrmRecord::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn mark_deleted(&self, id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE strm_records SET status = 'deleted', updated_at = ? WHERE id = ?",
        )
        .bind(current_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("record", id));
        }

        Ok(())
    }

    async fn count_active(&self, task_id: &TaskId) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM strm_records WHERE task_id = ? AND status = 'active'",
        )
        .bind(task_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }
}
