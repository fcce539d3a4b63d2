//! Watch cursor persistence.
//!
//! One row per drive holding the last change-event id already processed.
//! The cursor survives restarts so pollers resume where they left off
//! instead of replaying the whole event history.

use crate::models::current_timestamp;
use crate::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Repository trait for per-drive change cursors
#[async_trait]
pub trait WatchCursorRepository: Send + Sync {
    /// Last processed event id for a drive; 0 when never polled
    async fn get(&self, drive_id: &str) -> Result<i64>;

    /// Persist the cursor for a drive (upsert)
    async fn set(&self, drive_id: &str, last_event_id: i64) -> Result<()>;

    /// Drop the cursor so the next poll starts from the beginning
    async fn clear(&self, drive_id: &str) -> Result<()>;
}

/// SQLite implementation of WatchCursorRepository
pub struct SqliteWatchCursorRepository {
    pool: SqlitePool,
}

impl SqliteWatchCursorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WatchCursorRepository for SqliteWatchCursorRepository {
    async fn get(&self, drive_id: &str) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_event_id FROM watch_cursors WHERE drive_id = ?")
                .bind(drive_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map_or(0, |(id,)| id))
    }

    async fn set(&self, drive_id: &str, last_event_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO watch_cursors (drive_id, last_event_id, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(drive_id) DO UPDATE SET
                last_event_id = excluded.last_event_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(drive_id)
        .bind(last_event_id)
        .bind(current_timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, drive_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM watch_cursors WHERE drive_id = ?")
            .bind(drive_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Drive;
    use crate::repositories::{DriveRepository, SqliteDriveRepository};

    async fn setup() -> (SqliteWatchCursorRepository, String) {
        let pool = create_test_pool().await.unwrap();
        let drive = Drive::new("Home", "mockcloud");
        SqliteDriveRepository::new(pool.clone())
            .insert(&drive)
            .await
            .unwrap();
        (SqliteWatchCursorRepository::new(pool), drive.id)
    }

    #[tokio::test]
    async fn missing_cursor_reads_zero() {
        let (repo, drive_id) = setup().await;
        assert_eq!(repo.get(&drive_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_upserts() {
        let (repo, drive_id) = setup().await;
        repo.set(&drive_id, 42).await.unwrap();
        assert_eq!(repo.get(&drive_id).await.unwrap(), 42);

        repo.set(&drive_id, 99).await.unwrap();
        assert_eq!(repo.get(&drive_id).await.unwrap(), 99);
    }

    #[tokio::test]
    async fn clear_resets_to_zero() {
        let (repo, drive_id) = setup().await;
        repo.set(&drive_id, 7).await.unwrap();
        repo.clear(&drive_id).await.unwrap();
        assert_eq!(repo.get(&drive_id).await.unwrap(), 0);
    }
}
