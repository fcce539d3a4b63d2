//! Drive persistence.

use crate::models::{current_timestamp, Drive};
use crate::{Result, StoreError};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

/// Repository trait for drive persistence
#[async_trait]
pub trait DriveRepository: Send + Sync {
    /// Insert a new drive
    async fn insert(&self, drive: &Drive) -> Result<()>;

    /// Update an existing drive
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the drive doesn't exist.
    async fn update(&self, drive: &Drive) -> Result<()>;

    /// Find a drive by id
    async fn find_by_id(&self, id: &str) -> Result<Option<Drive>>;

    /// List all drives, most recently created first
    async fn list(&self) -> Result<Vec<Drive>>;

    /// Get the currently selected drive, if any
    async fn find_current(&self) -> Result<Option<Drive>>;

    /// Mark one drive current, clearing the flag on every other drive.
    ///
    /// Runs in a transaction so at most one drive carries the flag.
    async fn set_current(&self, id: &str) -> Result<()>;

    /// Attach or replace the credential reference of a drive
    async fn set_credential_ref(&self, id: &str, credential_ref: Option<&str>) -> Result<()>;

    /// Record that a pooled client for the drive was just used
    async fn touch_last_used(&self, id: &str) -> Result<()>;

    /// Delete a drive; tasks and cursors cascade
    async fn delete(&self, id: &str) -> Result<()>;
}

/// SQLite implementation of DriveRepository
pub struct SqliteDriveRepository {
    pool: SqlitePool,
}

impl SqliteDriveRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct DriveRow {
    id: String,
    display_name: String,
    backend: String,
    credential_ref: Option<String>,
    is_current: i64,
    created_at: i64,
    last_used_at: Option<i64>,
}

impl From<DriveRow> for Drive {
    fn from(row: DriveRow) -> Self {
        Drive {
            id: row.id,
            display_name: row.display_name,
            backend: row.backend,
            credential_ref: row.credential_ref,
            is_current: row.is_current != 0,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        }
    }
}

const DRIVE_COLUMNS: &str =
    "id, display_name, backend, credential_ref, is_current, created_at, last_used_at";

#[async_trait]
impl DriveRepository for SqliteDriveRepository {
    async fn insert(&self, drive: &Drive) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO drives (
                id, display_name, backend, credential_ref,
                is_current, created_at, last_used_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&drive.id)
        .bind(&drive.display_name)
        .bind(&drive.backend)
        .bind(&drive.credential_ref)
        .bind(drive.is_current as i64)
        .bind(drive.created_at)
        .bind(drive.last_used_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, drive: &Drive) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE drives SET
                display_name = ?,
                backend = ?,
                credential_ref = ?,
                is_current = ?,
                last_used_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&drive.display_name)
        .bind(&drive.backend)
        .bind(&drive.credential_ref)
        .bind(drive.is_current as i64)
        .bind(drive.last_used_at)
        .bind(&drive.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("drive", &drive.id));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Drive>> {
        let row = sqlx::query_as::<_, DriveRow>(&format!(
            "SELECT {DRIVE_COLUMNS} FROM drives WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Drive::from))
    }

    async fn list(&self) -> Result<Vec<Drive>> {
        let rows = sqlx::query_as::<_, DriveRow>(&format!(
            "SELECT {DRIVE_COLUMNS} FROM drives ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Drive::from).collect())
    }

    async fn find_current(&self) -> Result<Option<Drive>> {
        let row = sqlx::query_as::<_, DriveRow>(&format!(
            "SELECT {DRIVE_COLUMNS} FROM drives WHERE is_current = 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Drive::from))
    }

    async fn set_current(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE drives SET is_current = 0 WHERE is_current = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE drives SET is_current = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Roll back the clear rather than leaving no current drive
            tx.rollback().await?;
            return Err(StoreError::not_found("drive", id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_credential_ref(&self, id: &str, credential_ref: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE drives SET credential_ref = ? WHERE id = ?")
            .bind(credential_ref)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("drive", id));
        }

        Ok(())
    }

    async fn touch_last_used(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE drives SET last_used_at = ? WHERE id = ?")
            .bind(current_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM drives WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("drive", id));
        }

        Ok(())
    }
}
