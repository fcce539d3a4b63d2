//! # Change Watcher
//!
//! Per-drive polling of the remote change log. Every watched drive gets one
//! poller regardless of how many tasks watch it; the effective interval is
//! the minimum requested across watchers and each poll is shared by all of
//! them. A persisted per-drive cursor survives restarts so history is
//! neither replayed nor skipped.
//!
//! Relevance is decided by the fixed classification table on
//! [`EventKind`](provider_traits::EventKind); listeners fire at most once
//! per poll no matter how many relevant events a burst produced, and a poll
//! drains all pending pages before notifying so a burst collapses into a
//! single trigger.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use core_runtime::config::MIN_WATCH_POLL_SECS;
use core_runtime::events::{CoreEvent, EventBus, WatchEvent};
use core_store::WatchCursorRepository;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::pool::ConnectionPool;

/// Callback invoked with the drive id when relevant changes are detected.
pub type ChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct DrivePoller {
    /// Number of watchers registered for this drive
    watchers: usize,
    /// Effective poll interval (minimum across watchers)
    interval_secs: u64,
    handle: JoinHandle<()>,
}

struct WatcherInner {
    pool: Arc<ConnectionPool>,
    cursors: Arc<dyn WatchCursorRepository>,
    event_bus: EventBus,
    event_page_size: u32,
    pollers: Mutex<HashMap<String, DrivePoller>>,
    callbacks: std::sync::Mutex<HashMap<String, Vec<ChangeCallback>>>,
}

/// Ref-counted change pollers, one per watched drive.
#[derive(Clone)]
pub struct ChangeWatcher {
    inner: Arc<WatcherInner>,
}

impl ChangeWatcher {
    pub fn new(
        pool: Arc<ConnectionPool>,
        cursors: Arc<dyn WatchCursorRepository>,
        event_bus: EventBus,
        event_page_size: u32,
    ) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                pool,
                cursors,
                event_bus,
                event_page_size,
                pollers: Mutex::new(HashMap::new()),
                callbacks: std::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a watcher for a drive.
    ///
    /// Starts the drive's poller on first registration; later registrations
    /// only bump the refcount, restarting the poller when they lower the
    /// effective interval. Intervals below the global floor are clamped.
    pub async fn watch(&self, drive_id: &str, poll_interval_secs: u64) {
        let interval = poll_interval_secs.max(MIN_WATCH_POLL_SECS);
        let mut pollers = self.inner.pollers.lock().await;

        if let Some(poller) = pollers.get_mut(drive_id) {
            poller.watchers += 1;
            if interval < poller.interval_secs {
                debug!(
                    drive_id,
                    from = poller.interval_secs,
                    to = interval,
                    "lowering effective poll interval"
                );
                poller.handle.abort();
                poller.interval_secs = interval;
                poller.handle = spawn_poll_loop(&self.inner, drive_id, interval);
            }
            return;
        }

        info!(drive_id, interval_secs = interval, "starting drive watcher");
        let handle = spawn_poll_loop(&self.inner, drive_id, interval);
        pollers.insert(
            drive_id.to_string(),
            DrivePoller {
                watchers: 1,
                interval_secs: interval,
                handle,
            },
        );
        self.inner
            .event_bus
            .emit(CoreEvent::Watch(WatchEvent::WatchStarted {
                drive_id: drive_id.to_string(),
                interval_secs: interval,
            }))
            .ok();
    }

    /// Drop one watcher registration. The poller keeps running while at
    /// least one registration remains.
    pub async fn unwatch(&self, drive_id: &str) {
        let mut pollers = self.inner.pollers.lock().await;
        let Some(poller) = pollers.get_mut(drive_id) else {
            return;
        };
        poller.watchers = poller.watchers.saturating_sub(1);
        if poller.watchers > 0 {
            return;
        }

        info!(drive_id, "stopping drive watcher");
        poller.handle.abort();
        pollers.remove(drive_id);
        self.inner
            .event_bus
            .emit(CoreEvent::Watch(WatchEvent::WatchStopped {
                drive_id: drive_id.to_string(),
            }))
            .ok();
    }

    /// Register a callback fired (at most once per poll) when relevant
    /// changes are detected on a drive.
    pub fn on_change<F>(&self, drive_id: &str, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut callbacks = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        callbacks
            .entry(drive_id.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Run one poll cycle for a drive immediately, outside its interval.
    ///
    /// # Errors
    ///
    /// Propagates pool and provider failures; the persisted cursor is not
    /// advanced on failure.
    pub async fn poll_once(&self, drive_id: &str) -> Result<()> {
        self.inner.poll_drive(drive_id).await
    }

    /// Effective poll interval of a drive's poller, if one is running.
    pub async fn effective_interval(&self, drive_id: &str) -> Option<u64> {
        let pollers = self.inner.pollers.lock().await;
        pollers.get(drive_id).map(|p| p.interval_secs)
    }

    /// Number of drives currently being polled.
    pub async fn watched_drives(&self) -> usize {
        self.inner.pollers.lock().await.len()
    }

    /// Abort every poller. Called on shutdown.
    pub async fn shutdown(&self) {
        let mut pollers = self.inner.pollers.lock().await;
        for (_, poller) in pollers.drain() {
            poller.handle.abort();
        }
    }
}

fn spawn_poll_loop(inner: &Arc<WatcherInner>, drive_id: &str, interval_secs: u64) -> JoinHandle<()> {
    let inner = Arc::clone(inner);
    let drive_id = drive_id.to_string();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = inner.poll_drive(&drive_id).await {
                warn!(drive_id = %drive_id, error = %err, "event poll failed");
                inner
                    .event_bus
                    .emit(CoreEvent::Watch(WatchEvent::PollFailed {
                        drive_id: drive_id.clone(),
                        message: err.to_string(),
                    }))
                    .ok();
            }
        }
    })
}

impl WatcherInner {
    /// One poll cycle: drain every pending event page, advance the cursor
    /// to the highest observed id, notify listeners once if anything
    /// relevant appeared.
    async fn poll_drive(&self, drive_id: &str) -> Result<()> {
        let start_cursor = self.cursors.get(drive_id).await?;
        let bundle = self.pool.acquire(drive_id).await?;

        let mut cursor = start_cursor;
        let mut relevant: u64 = 0;
        loop {
            let page = bundle
                .client
                .get_events(cursor, self.event_page_size)
                .await?;
            if page.events.is_empty() {
                break;
            }

            relevant += page.events.iter().filter(|e| e.kind.is_relevant()).count() as u64;
            let advanced = page.next_cursor.max(page.max_event_id().unwrap_or(cursor));
            if advanced <= cursor {
                // A page that does not advance the cursor would loop forever
                warn!(drive_id, cursor, "event page did not advance cursor");
                break;
            }
            cursor = advanced;

            if !page.has_more {
                break;
            }
        }

        // Advance past irrelevant history too, so a stable prefix is never
        // re-fetched on behalf of nobody.
        if cursor > start_cursor {
            self.cursors.set(drive_id, cursor).await?;
        }

        if relevant > 0 {
            debug!(drive_id, relevant, cursor, "relevant remote changes detected");
            self.notify_listeners(drive_id);
            self.event_bus
                .emit(CoreEvent::Watch(WatchEvent::ChangesDetected {
                    drive_id: drive_id.to_string(),
                    relevant_events: relevant,
                    cursor,
                }))
                .ok();
        }

        self.pool.release(drive_id).await;
        Ok(())
    }

    fn notify_listeners(&self, drive_id: &str) {
        let listeners: Vec<ChangeCallback> = {
            let callbacks = self
                .callbacks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            callbacks.get(drive_id).cloned().unwrap_or_default()
        };
        for listener in listeners {
            listener(drive_id);
        }
    }
}
