//! # Sync Core Service
//!
//! Wires the store, pool, engine, scheduler, and watcher into one handle
//! the embedding process (route layer, desktop shell) owns. Startup primes
//! the scheduler from persisted tasks and connects watcher triggers to
//! scheduled runs; shutdown tears everything down in reverse.

use std::collections::HashSet;
use std::sync::Arc;

use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_store::{
    DatabaseConfig, DriveRepository, RecordRepository, RunLogRepository, SqliteDriveRepository,
    SqliteRecordRepository, SqliteRunLogRepository, SqliteTaskRepository,
    SqliteWatchCursorRepository, SqlitePool, SyncTask, TaskRepository, WatchCursorRepository,
};
use provider_traits::ProviderRegistry;
use tracing::{info, warn};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::pool::ConnectionPool;
use crate::scheduler::SyncScheduler;
use crate::watcher::ChangeWatcher;

/// One fully wired sync core.
///
/// Construct once per process with [`SyncCore::new`], then [`start`](Self::start)
/// it. All fields are cheaply cloneable handles.
pub struct SyncCore {
    db: SqlitePool,
    event_bus: EventBus,
    drives: Arc<dyn DriveRepository>,
    tasks: Arc<dyn TaskRepository>,
    records: Arc<dyn RecordRepository>,
    logs: Arc<dyn RunLogRepository>,
    cursors: Arc<dyn WatchCursorRepository>,
    pool: Arc<ConnectionPool>,
    scheduler: SyncScheduler,
    watcher: ChangeWatcher,
}

impl SyncCore {
    /// Open the database, run migrations, and wire every component.
    pub async fn new(config: CoreConfig, registry: Arc<ProviderRegistry>) -> Result<Self> {
        let db = core_store::create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let event_bus = EventBus::new(config.event_buffer_size);

        let drives: Arc<dyn DriveRepository> = Arc::new(SqliteDriveRepository::new(db.clone()));
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(db.clone()));
        let records: Arc<dyn RecordRepository> =
            Arc::new(SqliteRecordRepository::new(db.clone()));
        let logs: Arc<dyn RunLogRepository> = Arc::new(SqliteRunLogRepository::new(db.clone()));
        let cursors: Arc<dyn WatchCursorRepository> =
            Arc::new(SqliteWatchCursorRepository::new(db.clone()));

        let pool = Arc::new(ConnectionPool::new(
            registry,
            Arc::clone(&drives),
            config.pool_freshness_secs,
            event_bus.clone(),
        ));
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&tasks),
            Arc::clone(&records),
            event_bus.clone(),
            config.listing_page_size,
        ));
        let scheduler = SyncScheduler::new(
            Arc::clone(&pool),
            engine,
            Arc::clone(&tasks),
            Arc::clone(&logs),
            event_bus.clone(),
        );
        let watcher = ChangeWatcher::new(
            Arc::clone(&pool),
            Arc::clone(&cursors),
            event_bus.clone(),
            config.event_page_size,
        );

        Ok(Self {
            db,
            event_bus,
            drives,
            tasks,
            records,
            logs,
            cursors,
            pool,
            scheduler,
            watcher,
        })
    }

    /// Start the scheduler, prime it from the store, and start a watcher
    /// for every task with change watching enabled.
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await;
        let scheduled = self.scheduler.schedule_from_store().await?;
        info!(scheduled, "scheduler primed from store");

        let tasks = self.tasks.list().await?;
        let mut wired_drives: HashSet<String> = HashSet::new();
        for task in tasks.iter().filter(|t| t.watch.enabled) {
            self.watcher
                .watch(&task.drive_id, task.watch.poll_interval_secs)
                .await;
            if wired_drives.insert(task.drive_id.clone()) {
                self.wire_drive_trigger(&task.drive_id);
            }
        }
        Ok(())
    }

    /// Register a task's schedule and watch after it is created or updated.
    pub async fn register_task(&self, task: &SyncTask) -> Result<()> {
        self.scheduler.schedule(task).await?;
        if task.watch.enabled {
            self.watcher
                .watch(&task.drive_id, task.watch.poll_interval_secs)
                .await;
            self.wire_drive_trigger(&task.drive_id);
        }
        Ok(())
    }

    /// Remove a task from the scheduler and drop its watch registration.
    pub async fn deregister_task(&self, task: &SyncTask) {
        self.scheduler.unschedule(&task.id).await;
        if task.watch.enabled {
            self.watcher.unwatch(&task.drive_id).await;
        }
    }

    /// Stop the scheduler, abort all pollers, and drop pooled clients.
    /// In-flight passes run to completion first.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.watcher.shutdown().await;
        self.pool.evict_all().await;
        info!("sync core shut down");
    }

    /// On relevant changes, run every watching task on the drive. Overlaps
    /// with an in-flight pass are skipped by the single-flight gate.
    fn wire_drive_trigger(&self, drive_id: &str) {
        let scheduler = self.scheduler.clone();
        let tasks = Arc::clone(&self.tasks);
        self.watcher.on_change(drive_id, move |drive_id| {
            let scheduler = scheduler.clone();
            let tasks = Arc::clone(&tasks);
            let drive_id = drive_id.to_string();
            tokio::spawn(async move {
                let watching = match tasks.find_watching_by_drive(&drive_id).await {
                    Ok(watching) => watching,
                    Err(err) => {
                        warn!(drive_id = %drive_id, error = %err, "could not load watching tasks");
                        return;
                    }
                };
                for task in watching {
                    match scheduler.run_now(&task.id, false).await {
                        Ok(_) | Err(SyncError::AlreadyRunning { .. }) => {}
                        Err(err) => {
                            warn!(task_id = %task.id, error = %err, "change-triggered run failed")
                        }
                    }
                }
            });
        });
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn drives(&self) -> &Arc<dyn DriveRepository> {
        &self.drives
    }

    pub fn tasks(&self) -> &Arc<dyn TaskRepository> {
        &self.tasks
    }

    pub fn records(&self) -> &Arc<dyn RecordRepository> {
        &self.records
    }

    pub fn logs(&self) -> &Arc<dyn RunLogRepository> {
        &self.logs
    }

    pub fn cursors(&self) -> &Arc<dyn WatchCursorRepository> {
        &self.cursors
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub fn watcher(&self) -> &ChangeWatcher {
        &self.watcher
    }
}
