//! Sync task persistence.
//!
//! Tasks carry two JSON columns: the schedule definition and the custom
//! extension list. Both are serialized with `serde_json` so schedule shapes
//! can evolve without schema migrations.

use crate::models::{
    current_timestamp, FileFilter, ScheduleKind, SyncTask, TaskId, TaskProgress, TaskStatus,
    WatchConfig,
};
use crate::{Result, StoreError};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

/// Repository trait for sync task persistence
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task
    async fn insert(&self, task: &SyncTask) -> Result<()>;

    /// Update an existing task
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task doesn't exist.
    async fn update(&self, task: &SyncTask) -> Result<()>;

    /// Find a task by id
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<SyncTask>>;

    /// List all tasks, most recently created first
    async fn list(&self) -> Result<Vec<SyncTask>>;

    /// List tasks bound to a drive
    async fn find_by_drive(&self, drive_id: &str) -> Result<Vec<SyncTask>>;

    /// List tasks on a drive with change watching enabled
    async fn find_watching_by_drive(&self, drive_id: &str) -> Result<Vec<SyncTask>>;

    /// Overwrite the live progress counters of a task
    async fn update_progress(&self, id: &TaskId, progress: TaskProgress) -> Result<()>;

    /// Overwrite the status of a task
    async fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<()>;

    /// Delete a task; records and logs cascade
    async fn delete(&self, id: &TaskId) -> Result<()>;
}

/// SQLite implementation of TaskRepository
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    name: String,
    drive_id: String,
    source_node_id: String,
    output_dir: String,
    base_url: String,
    include_video: i64,
    include_audio: i64,
    custom_extensions: String,
    preserve_structure: i64,
    delete_orphans: i64,
    overwrite_strm: i64,
    delete_strm_files: i64,
    schedule: String,
    watch_enabled: i64,
    watch_poll_secs: i64,
    total_runs: i64,
    total_strm_generated: i64,
    last_run_at: Option<i64>,
    last_run_status: Option<String>,
    last_run_message: Option<String>,
    current_file_index: i64,
    total_files: i64,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<TaskRow> for SyncTask {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let schedule: ScheduleKind = serde_json::from_str(&row.schedule)
            .map_err(|e| StoreError::invalid("schedule", e.to_string()))?;
        let custom_extensions: Vec<String> = serde_json::from_str(&row.custom_extensions)
            .map_err(|e| StoreError::invalid("custom_extensions", e.to_string()))?;
        let status: TaskStatus = row.status.parse()?;
        let last_run_status = row
            .last_run_status
            .as_deref()
            .map(str::parse::<TaskStatus>)
            .transpose()?;

        Ok(SyncTask {
            id: TaskId::from_string(&row.id)?,
            name: row.name,
            drive_id: row.drive_id,
            source_node_id: row.source_node_id,
            output_dir: row.output_dir,
            base_url: row.base_url,
            filter: FileFilter {
                include_video: row.include_video != 0,
                include_audio: row.include_audio != 0,
                custom_extensions,
            },
            preserve_structure: row.preserve_structure != 0,
            delete_orphans: row.delete_orphans != 0,
            overwrite_strm: row.overwrite_strm != 0,
            delete_strm_files: row.delete_strm_files != 0,
            schedule,
            watch: WatchConfig {
                enabled: row.watch_enabled != 0,
                poll_interval_secs: row.watch_poll_secs.max(0) as u64,
            },
            total_runs: row.total_runs.max(0) as u64,
            total_strm_generated: row.total_strm_generated.max(0) as u64,
            last_run_at: row.last_run_at,
            last_run_status,
            last_run_message: row.last_run_message,
            progress: TaskProgress {
                current_file_index: row.current_file_index.max(0) as u64,
                total_files: row.total_files.max(0) as u64,
            },
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const TASK_COLUMNS: &str = "id, name, drive_id, source_node_id, output_dir, base_url, \
     include_video, include_audio, custom_extensions, \
     preserve_structure, delete_orphans, overwrite_strm, delete_strm_files, \
     schedule, watch_enabled, watch_poll_secs, \
     total_runs, total_strm_generated, last_run_at, last_run_status, last_run_message, \
     current_file_index, total_files, status, created_at, updated_at";

fn schedule_json(schedule: &ScheduleKind) -> Result<String> {
    serde_json::to_string(schedule).map_err(|e| StoreError::invalid("schedule", e.to_string()))
}

fn extensions_json(extensions: &[String]) -> Result<String> {
    serde_json::to_string(extensions)
        .map_err(|e| StoreError::invalid("custom_extensions", e.to_string()))
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert(&self, task: &SyncTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_tasks (
                id, name, drive_id, source_node_id, output_dir, base_url,
                include_video, include_audio, custom_extensions,
                preserve_structure, delete_orphans, overwrite_strm, delete_strm_files,
                schedule, watch_enabled, watch_poll_secs,
                total_runs, total_strm_generated, last_run_at, last_run_status, last_run_message,
                current_file_index, total_files, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.as_str())
        .bind(&task.name)
        .bind(&task.drive_id)
        .bind(&task.source_node_id)
        .bind(&task.output_dir)
        .bind(&task.base_url)
        .bind(task.filter.include_video as i64)
        .bind(task.filter.include_audio as i64)
        .bind(extensions_json(&task.filter.custom_extensions)?)
        .bind(task.preserve_structure as i64)
        .bind(task.delete_orphans as i64)
        .bind(task.overwrite_strm as i64)
        .bind(task.delete_strm_files as i64)
        .bind(schedule_json(&task.schedule)?)
        .bind(task.watch.enabled as i64)
        .bind(task.watch.poll_interval_secs as i64)
        .bind(task.total_runs as i64)
        .bind(task.total_strm_generated as i64)
        .bind(task.last_run_at)
        .bind(task.last_run_status.map(|s| s.as_str()))
        .bind(&task.last_run_message)
        .bind(task.progress.current_file_index as i64)
        .bind(task.progress.total_files as i64)
        .bind(task.status.as_str())
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, task: &SyncTask) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_tasks SET
                name = ?,
                source_node_id = ?,
                output_dir = ?,
                base_url = ?,
                include_video = ?,
                include_audio = ?,
                custom_extensions = ?,
                preserve_structure = ?,
                delete_orphans = ?,
                overwrite_strm = ?,
                delete_strm_files = ?,
                schedule = ?,
                watch_enabled = ?,
                watch_poll_secs = ?,
                total_runs = ?,
                total_strm_generated = ?,
                last_run_at = ?,
                last_run_status = ?,
                last_run_message = ?,
                current_file_index = ?,
                total_files = ?,
                status = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.name)
        .bind(&task.source_node_id)
        .bind(&task.output_dir)
        .bind(&task.base_url)
        .bind(task.filter.include_video as i64)
        .bind(task.filter.include_audio as i64)
        .bind(extensions_json(&task.filter.custom_extensions)?)
        .bind(task.preserve_structure as i64)
        .bind(task.delete_orphans as i64)
        .bind(task.overwrite_strm as i64)
        .bind(task.delete_strm_files as i64)
        .bind(schedule_json(&task.schedule)?)
        .bind(task.watch.enabled as i64)
        .bind(task.watch.poll_interval_secs as i64)
        .bind(task.total_runs as i64)
        .bind(task.total_strm_generated as i64)
        .bind(task.last_run_at)
        .bind(task.last_run_status.map(|s| s.as_str()))
        .bind(&task.last_run_message)
        .bind(task.progress.current_file_index as i64)
        .bind(task.progress.total_files as i64)
        .bind(task.status.as_str())
        .bind(current_timestamp())
        .bind(task.id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", task.id.as_str()));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> Result<Option<SyncTask>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM sync_tasks WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncTask::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<SyncTask>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM sync_tasks ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(SyncTask::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn find_by_drive(&self, drive_id: &str) -> Result<Vec<SyncTask>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM sync_tasks WHERE drive_id = ? ORDER BY created_at DESC"
        ))
        .bind(drive_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(SyncTask::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn find_watching_by_drive(&self, drive_id: &str) -> Result<Vec<SyncTask>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM sync_tasks \
             WHERE drive_id = ? AND watch_enabled = 1 ORDER BY created_at DESC"
        ))
        .bind(drive_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(SyncTask::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn update_progress(&self, id: &TaskId, progress: TaskProgress) -> Result<()> {
        let result = sqlx::query(
            "UPDATE sync_tasks SET current_file_index = ?, total_files = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(progress.current_file_index as i64)
        .bind(progress.total_files as i64)
        .bind(current_timestamp())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", id.as_str()));
        }

        Ok(())
    }

    async fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE sync_tasks SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(current_timestamp())
                .bind(id.as_str())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", id.as_str()));
        }

        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<()> {
        let result = sqlx::query("DELETE FROM sync_tasks WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("task", id.as_str()));
        }

        Ok(())
    }
}
