//! # Sync Scheduler
//!
//! Timer-driven execution of sync tasks. Each scheduled task maps to a next
//! fire time computed from its schedule; the driver loop sleeps until the
//! soonest pending fire time across all tasks instead of ticking at a fixed
//! rate. Firings and manual runs funnel through the same single-flight gate:
//! at most one pass per task is ever in flight, overlapping firings are
//! skipped, never queued.
//!
//! The single-flight set is process-local by design. It must not be
//! persisted: a crashed process would otherwise leave tasks permanently
//! locked.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_store::{
    LogCounters, RunLog, RunLogRepository, ScheduleKind, SyncTask, TaskId, TaskProgress,
    TaskRepository, TaskStatus,
};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::pool::ConnectionPool;
use crate::schedule::{next_fire_time, validate_schedule};

/// Fallback sleep when nothing is scheduled.
const IDLE_SLEEP_SECS: u64 = 3600;

/// Snapshot of the scheduler's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    /// Whether the driver loop is running
    pub running: bool,
    /// Number of tasks with a pending fire time
    pub scheduled_count: usize,
    /// Number of passes currently in flight
    pub active_count: usize,
}

struct ScheduledEntry {
    schedule: ScheduleKind,
    next_fire: DateTime<Utc>,
}

struct SchedulerInner {
    pool: Arc<ConnectionPool>,
    engine: Arc<SyncEngine>,
    tasks: Arc<dyn TaskRepository>,
    logs: Arc<dyn RunLogRepository>,
    event_bus: EventBus,
    scheduled: Mutex<HashMap<String, ScheduledEntry>>,
    /// Single-flight gate: task ids with a pass in flight
    active: Mutex<HashSet<String>>,
    notify: Notify,
    running: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Timer loop plus manual-run entry point for sync tasks.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl SyncScheduler {
    pub fn new(
        pool: Arc<ConnectionPool>,
        engine: Arc<SyncEngine>,
        tasks: Arc<dyn TaskRepository>,
        logs: Arc<dyn RunLogRepository>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                pool,
                engine,
                tasks,
                logs,
                event_bus,
                scheduled: Mutex::new(HashMap::new()),
                active: Mutex::new(HashSet::new()),
                notify: Notify::new(),
                running: AtomicBool::new(false),
                driver: Mutex::new(None),
            }),
        }
    }

    /// Start the driver loop. Idempotent.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            driver_loop(inner).await;
        });
        *self.inner.driver.lock().await = Some(handle);
        info!("scheduler started");
    }

    /// Stop the driver loop and wait for it to exit. In-flight passes run
    /// to completion; there is no mid-pass cancellation.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.notify.notify_waiters();
        let handle = self.inner.driver.lock().await.take();
        if let Some(handle) = handle {
            handle.await.ok();
        }
        info!("scheduler stopped");
    }

    /// Register a task's schedule, replacing any previous registration.
    ///
    /// A disabled schedule unregisters the task. Malformed schedules are
    /// rejected here rather than at the first firing.
    pub async fn schedule(&self, task: &SyncTask) -> Result<()> {
        validate_schedule(&task.schedule)?;

        if !task.schedule.is_enabled() {
            self.unschedule(&task.id).await;
            return Ok(());
        }

        let next = next_fire_time(&task.schedule, Utc::now())?.ok_or_else(|| {
            SyncError::InvalidSchedule("schedule has no future fire time".to_string())
        })?;

        debug!(task_id = %task.id, next_fire = %next, "task scheduled");
        {
            let mut scheduled = self.inner.scheduled.lock().await;
            scheduled.insert(
                task.id.as_str(),
                ScheduledEntry {
                    schedule: task.schedule.clone(),
                    next_fire: next,
                },
            );
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Load every task from the store and register the enabled schedules.
    pub async fn schedule_from_store(&self) -> Result<usize> {
        let tasks = self.inner.tasks.list().await?;
        let mut count = 0;
        for task in &tasks {
            if !task.schedule.is_enabled() {
                continue;
            }
            match self.schedule(task).await {
                Ok(()) => count += 1,
                Err(err) => {
                    warn!(task_id = %task.id, error = %err, "skipping task with bad schedule")
                }
            }
        }
        Ok(count)
    }

    /// Remove a task from the timer. A pass already in flight is unaffected.
    pub async fn unschedule(&self, task_id: &TaskId) {
        let removed = {
            let mut scheduled = self.inner.scheduled.lock().await;
            scheduled.remove(&task_id.as_str())
        };
        if removed.is_some() {
            debug!(task_id = %task_id, "task unscheduled");
            self.inner.notify.notify_waiters();
        }
    }

    /// Run a task immediately, outside its schedule, and wait for the pass
    /// to finish.
    ///
    /// `force` bypasses the task's persisted `running` status (useful after
    /// a crash left it stale) but never the process-local single-flight
    /// gate: a task with a pass actually in flight returns
    /// [`SyncError::AlreadyRunning`] without starting a second pass or
    /// writing a second log.
    pub async fn run_now(&self, task_id: &TaskId, force: bool) -> Result<LogCounters> {
        let task = self
            .inner
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| SyncError::TaskNotFound {
                task_id: task_id.as_str(),
            })?;

        if !force && task.status == TaskStatus::Running {
            return Err(SyncError::AlreadyRunning {
                task_id: task_id.as_str(),
            });
        }

        self.inner.execute(task_id).await
    }

    /// Current scheduler state.
    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.inner.running.load(Ordering::SeqCst),
            scheduled_count: self.inner.scheduled.lock().await.len(),
            active_count: self.inner.active.lock().await.len(),
        }
    }
}

async fn driver_loop(inner: Arc<SchedulerInner>) {
    info!("scheduler driver loop running");
    while inner.running.load(Ordering::SeqCst) {
        let now = Utc::now();
        let mut due: Vec<TaskId> = Vec::new();
        let mut next_wake: Option<DateTime<Utc>> = None;
        let mut dead: Vec<String> = Vec::new();

        {
            let mut scheduled = inner.scheduled.lock().await;
            for (id, entry) in scheduled.iter_mut() {
                if entry.next_fire <= now {
                    match TaskId::from_string(id) {
                        Ok(task_id) => due.push(task_id),
                        Err(err) => {
                            error!(task_id = %id, error = %err, "dropping unparseable task id");
                            dead.push(id.clone());
                            continue;
                        }
                    }
                    match next_fire_time(&entry.schedule, now) {
                        Ok(Some(next)) => entry.next_fire = next,
                        Ok(None) | Err(_) => {
                            dead.push(id.clone());
                            continue;
                        }
                    }
                }
                next_wake = match next_wake {
                    Some(current) if current <= entry.next_fire => Some(current),
                    _ => Some(entry.next_fire),
                };
            }
            for id in &dead {
                scheduled.remove(id);
            }
        }

        for task_id in due {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                inner.fire(&task_id).await;
            });
        }

        let sleep_for = next_wake
            .map(|wake| {
                (wake - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::from_millis(0))
            })
            .unwrap_or(Duration::from_secs(IDLE_SLEEP_SECS));

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = inner.notify.notified() => {}
        }
    }
    info!("scheduler driver loop exited");
}

impl SchedulerInner {
    /// Timer-firing entry point: overlapping firings are skipped silently,
    /// task-level failures are recorded by `execute` and never propagate
    /// into the driver loop.
    async fn fire(&self, task_id: &TaskId) {
        match self.execute(task_id).await {
            Ok(_) => {}
            Err(SyncError::AlreadyRunning { .. }) => {
                debug!(task_id = %task_id, "firing skipped, pass already in flight");
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Skipped {
                        task_id: task_id.as_str(),
                    }))
                    .ok();
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "scheduled run failed");
            }
        }
    }

    /// Run one pass under the single-flight gate.
    async fn execute(&self, task_id: &TaskId) -> Result<LogCounters> {
        {
            let mut active = self.active.lock().await;
            if !active.insert(task_id.as_str()) {
                return Err(SyncError::AlreadyRunning {
                    task_id: task_id.as_str(),
                });
            }
        }

        let result = self.execute_locked(task_id).await;

        {
            let mut active = self.active.lock().await;
            active.remove(&task_id.as_str());
        }

        result
    }

    async fn execute_locked(&self, task_id: &TaskId) -> Result<LogCounters> {
        let mut task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| SyncError::TaskNotFound {
                task_id: task_id.as_str(),
            })?;

        self.tasks.set_status(task_id, TaskStatus::Running).await?;
        self.tasks
            .update_progress(task_id, TaskProgress::default())
            .await?;
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                task_id: task_id.as_str(),
                task_name: task.name.clone(),
                drive_id: task.drive_id.clone(),
            }))
            .ok();

        let bundle = match self.pool.acquire(&task.drive_id).await {
            Ok(bundle) => bundle,
            Err(err) if err.is_auth() => {
                // The sync never started: mark the task but write no log.
                warn!(task_id = %task_id, error = %err, "credential invalid, run aborted");
                task.record_run(TaskStatus::Error, err.to_string(), 0);
                self.tasks.update(&task).await?;
                self.emit_failed(task_id, &err);
                return Err(err);
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "could not acquire client");
                let mut log = RunLog::begin(*task_id);
                log.fail(err.to_string(), None, LogCounters::default())?;
                self.logs.insert(&log).await?;
                task.record_run(TaskStatus::Error, err.to_string(), 0);
                self.tasks.update(&task).await?;
                self.emit_failed(task_id, &err);
                return Err(err);
            }
        };

        let mut log = RunLog::begin(*task_id);
        self.logs.insert(&log).await?;

        match self.engine.reconcile(&bundle, &task).await {
            Ok(counters) => {
                log.finish(counters)?;
                self.logs.update(&log).await?;

                let message = log.message.clone().unwrap_or_default();
                task.record_run(
                    TaskStatus::Success,
                    message,
                    counters.generated().max(0) as u64,
                );
                self.tasks.update(&task).await?;
                self.pool.release(&task.drive_id).await;

                info!(
                    task_id = %task_id,
                    scanned = counters.scanned,
                    added = counters.added,
                    updated = counters.updated,
                    deleted = counters.deleted,
                    skipped = counters.skipped,
                    "sync pass completed"
                );
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Completed {
                        task_id: task_id.as_str(),
                        scanned: counters.scanned.max(0) as u64,
                        added: counters.added.max(0) as u64,
                        updated: counters.updated.max(0) as u64,
                        deleted: counters.deleted.max(0) as u64,
                        skipped: counters.skipped.max(0) as u64,
                        duration_ms: log.duration_ms.unwrap_or(0).max(0) as u64,
                    }))
                    .ok();

                Ok(counters)
            }
            Err(err) => {
                log.fail(err.to_string(), None, LogCounters::default())?;
                self.logs.update(&log).await?;

                task.record_run(TaskStatus::Error, err.to_string(), 0);
                self.tasks.update(&task).await?;

                if err.is_auth() {
                    self.pool.evict(&task.drive_id).await;
                }
                self.emit_failed(task_id, &err);
                Err(err)
            }
        }
    }

    fn emit_failed(&self, task_id: &TaskId, err: &SyncError) {
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Failed {
                task_id: task_id.as_str(),
                message: err.to_string(),
            }))
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConnectionPool;
    use async_trait::async_trait;
    use core_runtime::events::EventBus;
    use core_store::{
        create_test_pool, Drive, DriveRepository, IntervalUnit, RecordRepository, RunStatus,
        SqliteDriveRepository, SqliteRecordRepository, SqliteRunLogRepository,
        SqliteTaskRepository,
    };
    use provider_traits::{
        CloudProvider, EventPage, FileListing, ProviderRegistry, RemoteEntry,
    };
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Provider whose single listing call blocks until released, so tests
    /// can hold a pass open while probing the single-flight gate.
    struct GatedProvider {
        gate: Arc<Semaphore>,
        listings: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CloudProvider for GatedProvider {
        async fn list_files(
            &self,
            _: &str,
            _: u32,
            _: u64,
        ) -> provider_traits::Result<FileListing> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.map_err(|_| {
                provider_traits::ProviderError::Unavailable("gate closed".to_string())
            })?;
            Ok(FileListing {
                entries: vec![RemoteEntry {
                    id: "f1".to_string(),
                    name: "movie.mkv".to_string(),
                    parent_id: None,
                    size: Some(100),
                    is_folder: false,
                    content_id: Some("c1".to_string()),
                    created_at: None,
                    modified_at: None,
                }],
                total: 1,
            })
        }

        async fn search_files(
            &self,
            _: &str,
            _: &str,
        ) -> provider_traits::Result<Vec<RemoteEntry>> {
            Ok(Vec::new())
        }

        async fn get_download_identifier(&self, file_id: &str) -> provider_traits::Result<String> {
            Ok(file_id.to_string())
        }

        async fn validate_credential(&self) -> provider_traits::Result<bool> {
            Ok(true)
        }

        async fn get_events(&self, cursor: i64, _: u32) -> provider_traits::Result<EventPage> {
            Ok(EventPage {
                events: Vec::new(),
                next_cursor: cursor,
                has_more: false,
            })
        }
    }

    struct Fixture {
        scheduler: SyncScheduler,
        tasks: Arc<SqliteTaskRepository>,
        logs: Arc<SqliteRunLogRepository>,
        task: SyncTask,
        gate: Arc<Semaphore>,
        _out: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let db = create_test_pool().await.unwrap();
        let drives = Arc::new(SqliteDriveRepository::new(db.clone()));
        let tasks = Arc::new(SqliteTaskRepository::new(db.clone()));
        let records = Arc::new(SqliteRecordRepository::new(db.clone()));
        let logs = Arc::new(SqliteRunLogRepository::new(db.clone()));

        let mut drive = Drive::new("Home", "mockcloud");
        drive.credential_ref = Some("secret://home".to_string());
        drives.insert(&drive).await.unwrap();

        let out = tempfile::tempdir().unwrap();
        let mut task = SyncTask::new(
            "Movies",
            &drive.id,
            "root",
            out.path().to_string_lossy(),
            "http://host",
        );
        task.schedule = ScheduleKind::Interval {
            value: 1,
            unit: IntervalUnit::Hours,
        };
        tasks.insert(&task).await.unwrap();

        let gate = Arc::new(Semaphore::new(1));
        let listings = Arc::new(AtomicUsize::new(0));
        let registry = ProviderRegistry::new();
        {
            let gate = Arc::clone(&gate);
            let listings = Arc::clone(&listings);
            registry.register("mockcloud", move |_| {
                Ok(Arc::new(GatedProvider {
                    gate: Arc::clone(&gate),
                    listings: Arc::clone(&listings),
                }) as Arc<dyn CloudProvider>)
            });
        }

        let event_bus = EventBus::new(64);
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(registry),
            drives.clone() as Arc<dyn DriveRepository>,
            300,
            event_bus.clone(),
        ));
        let engine = Arc::new(SyncEngine::new(
            tasks.clone() as Arc<dyn TaskRepository>,
            records as Arc<dyn RecordRepository>,
            event_bus.clone(),
            100,
        ));
        let scheduler = SyncScheduler::new(
            pool,
            engine,
            tasks.clone() as Arc<dyn TaskRepository>,
            logs.clone() as Arc<dyn RunLogRepository>,
            event_bus,
        );

        Fixture {
            scheduler,
            tasks,
            logs,
            task,
            gate,
            _out: out,
        }
    }

    #[tokio::test]
    async fn run_now_executes_and_logs() {
        let f = fixture().await;
        let counters = f.scheduler.run_now(&f.task.id, false).await.unwrap();
        assert_eq!(counters.added, 1);

        let log = f.logs.find_latest(&f.task.id).await.unwrap().unwrap();
        assert_eq!(log.status, RunStatus::Success);
        assert_eq!(log.counters.added, 1);

        let task = f.tasks.find_by_id(&f.task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.total_runs, 1);
        assert_eq!(task.total_strm_generated, 1);
    }

    #[tokio::test]
    async fn concurrent_run_now_is_rejected_without_second_log() {
        let f = fixture().await;

        // Hold the provider gate so the first pass stays in flight
        let permit = f.gate.acquire().await.unwrap();

        let scheduler = f.scheduler.clone();
        let task_id = f.task.id;
        let first = tokio::spawn(async move { scheduler.run_now(&task_id, false).await });

        // Wait until the first pass holds the single-flight lock
        for _ in 0..100 {
            if f.scheduler.status().await.active_count == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.scheduler.status().await.active_count, 1);

        // Second attempt bounces immediately, force or not
        let err = f.scheduler.run_now(&f.task.id, true).await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning { .. }));

        drop(permit);
        first.await.unwrap().unwrap();

        // Exactly one log for the single pass that ran
        let history = f.logs.get_history(&f.task.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn run_now_unknown_task_errors() {
        let f = fixture().await;
        let missing = TaskId::new();
        assert!(matches!(
            f.scheduler.run_now(&missing, false).await,
            Err(SyncError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn force_bypasses_stale_running_status() {
        let f = fixture().await;
        // Simulate a crash that left the persisted status at running
        f.tasks
            .set_status(&f.task.id, TaskStatus::Running)
            .await
            .unwrap();

        let err = f.scheduler.run_now(&f.task.id, false).await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning { .. }));

        let counters = f.scheduler.run_now(&f.task.id, true).await.unwrap();
        assert_eq!(counters.added, 1);
    }

    #[tokio::test]
    async fn schedule_and_unschedule_update_status() {
        let f = fixture().await;
        f.scheduler.schedule(&f.task).await.unwrap();
        assert_eq!(f.scheduler.status().await.scheduled_count, 1);

        let mut disabled = f.task.clone();
        disabled.schedule = ScheduleKind::Disabled;
        f.scheduler.schedule(&disabled).await.unwrap();
        assert_eq!(f.scheduler.status().await.scheduled_count, 0);
    }

    #[tokio::test]
    async fn rejects_bad_cron_at_registration() {
        let f = fixture().await;
        let mut task = f.task.clone();
        task.schedule = ScheduleKind::Cron {
            expr: "nope".to_string(),
        };
        assert!(matches!(
            f.scheduler.schedule(&task).await,
            Err(SyncError::InvalidSchedule(_))
        ));
    }

    #[tokio::test]
    async fn timer_fires_scheduled_task() {
        let f = fixture().await;
        let mut task = f.task.clone();
        task.schedule = ScheduleKind::Interval {
            value: 1,
            unit: IntervalUnit::Seconds,
        };
        f.tasks.update(&task).await.unwrap();

        f.scheduler.start().await;
        f.scheduler.schedule(&task).await.unwrap();

        let mut fired = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let current = f.tasks.find_by_id(&task.id).await.unwrap().unwrap();
            if current.total_runs >= 1 {
                fired = true;
                break;
            }
        }
        f.scheduler.stop().await;
        assert!(fired, "scheduled task should have fired within five seconds");
    }
}
