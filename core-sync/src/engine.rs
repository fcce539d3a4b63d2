//! # Sync Engine
//!
//! Walks a remote subtree and reconciles it against the task's recorded
//! pointer files. Each qualifying remote file maps to one `.strm` file whose
//! sole content is a playback URL; the pass decides per file whether to
//! create, rewrite, or leave it alone, then sweeps records whose remote file
//! disappeared.
//!
//! Error policy: store failures abort the pass, everything per-file
//! (unwritable pointer, unresolvable content id) is absorbed into the
//! `skipped` counter and the pass continues.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_store::{
    LogCounters, RecordRepository, StrmRecord, SyncTask, TaskProgress, TaskRepository,
};
use provider_traits::{CloudProvider, RemoteEntry};
use tracing::{debug, warn};

use crate::error::Result;
use crate::pool::ClientBundle;

/// Path segment between the base URL and the content id in pointer contents.
pub const PLAYBACK_PATH_SEGMENT: &str = "play";

/// Extension of generated pointer files.
pub const STRM_EXTENSION: &str = "strm";

/// How many files to process between progress flushes.
const PROGRESS_FLUSH_EVERY: u64 = 10;

/// One reconciliation pass per call; stateless between passes.
pub struct SyncEngine {
    tasks: Arc<dyn TaskRepository>,
    records: Arc<dyn RecordRepository>,
    event_bus: EventBus,
    listing_page_size: u32,
}

impl SyncEngine {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        records: Arc<dyn RecordRepository>,
        event_bus: EventBus,
        listing_page_size: u32,
    ) -> Self {
        Self {
            tasks,
            records,
            event_bus,
            listing_page_size,
        }
    }

    /// Run one reconciliation pass for `task` using the pooled client.
    ///
    /// Traverses breadth-first from the task's source node, classifies each
    /// file through the task's filter, writes or rewrites pointer files, and
    /// finally sweeps orphaned records. Returns the pass counters.
    ///
    /// # Errors
    ///
    /// Fails on unreachable listings (provider errors at the tree level) and
    /// on store failures. Per-file problems never abort the pass.
    pub async fn reconcile(&self, bundle: &ClientBundle, task: &SyncTask) -> Result<LogCounters> {
        let client = &bundle.client;
        let mut counters = LogCounters::default();
        let mut progress = TaskProgress::default();
        // Remote file ids observed (and qualifying) this pass
        let mut seen: HashSet<String> = HashSet::new();
        // Pointer paths claimed this pass; first-seen entry wins collisions
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        let mut queue: VecDeque<(String, PathBuf)> = VecDeque::new();
        queue.push_back((task.source_node_id.clone(), PathBuf::new()));

        while let Some((node_id, rel_dir)) = queue.pop_front() {
            let mut offset = 0u64;
            loop {
                let listing = client
                    .list_files(&node_id, self.listing_page_size, offset)
                    .await?;
                let page_len = listing.entries.len() as u64;
                if page_len == 0 {
                    break;
                }

                for entry in listing.entries {
                    if entry.is_folder {
                        queue.push_back((entry.id.clone(), rel_dir.join(&entry.name)));
                        continue;
                    }
                    progress.total_files += 1;
                    counters.scanned += 1;
                    self.process_file(
                        client,
                        task,
                        &entry,
                        &rel_dir,
                        &mut seen,
                        &mut claimed,
                        &mut counters,
                    )
                    .await?;
                    progress.current_file_index += 1;
                    if progress.current_file_index % PROGRESS_FLUSH_EVERY == 0 {
                        self.flush_progress(task, progress).await;
                    }
                }

                offset += page_len;
                if offset >= listing.total {
                    break;
                }
            }
        }

        self.flush_progress(task, progress).await;
        self.sweep_orphans(task, &seen, &mut counters).await?;

        Ok(counters)
    }

    /// Classify one remote file and apply the write decision.
    async fn process_file(
        &self,
        client: &Arc<dyn CloudProvider>,
        task: &SyncTask,
        entry: &RemoteEntry,
        rel_dir: &Path,
        seen: &mut HashSet<String>,
        claimed: &mut HashSet<PathBuf>,
        counters: &mut LogCounters,
    ) -> Result<()> {
        let Some(ext) = entry.extension() else {
            return Ok(());
        };
        if !task.filter.matches(&ext) {
            return Ok(());
        }
        seen.insert(entry.id.clone());

        // Zero-byte files cannot be played
        if entry.size == Some(0) {
            counters.skipped += 1;
            return Ok(());
        }

        let content_id = match self.resolve_content_id(client, entry).await {
            Some(id) => id,
            None => {
                counters.skipped += 1;
                return Ok(());
            }
        };

        let strm_rel = if task.preserve_structure {
            rel_dir.join(strm_file_name(&entry.name))
        } else {
            PathBuf::from(strm_file_name(&entry.name))
        };
        let strm_path = Path::new(&task.output_dir).join(strm_rel);
        if !claimed.insert(strm_path.clone()) {
            // Name collision in flat layout: first-seen entry keeps the path
            counters.skipped += 1;
            return Ok(());
        }

        let strm_path_str = strm_path.to_string_lossy().into_owned();
        let content = pointer_content(&task.base_url, &content_id);
        let remote_path = rel_dir.join(&entry.name).to_string_lossy().into_owned();
        let size = entry.size.unwrap_or(0) as i64;

        match self.records.find_active_by_file(&task.id, &entry.id).await? {
            None => {
                if write_pointer(&strm_path, &content).await.is_err() {
                    counters.skipped += 1;
                    return Ok(());
                }
                let record = StrmRecord::new(
                    task.id,
                    &entry.id,
                    &content_id,
                    &entry.name,
                    size,
                    remote_path,
                    strm_path_str,
                    content,
                );
                self.records.insert(&record).await?;
                counters.added += 1;
            }
            Some(mut record) => {
                let moved = record.strm_path != strm_path_str;
                let changed = moved || record.strm_content != content;
                if !changed && !task.overwrite_strm {
                    counters.skipped += 1;
                    return Ok(());
                }

                if write_pointer(&strm_path, &content).await.is_err() {
                    counters.skipped += 1;
                    return Ok(());
                }
                if moved {
                    remove_pointer(Path::new(&record.strm_path)).await;
                }
                record.refresh(&content_id, strm_path_str, content, size);
                self.records.update(&record).await?;
                counters.updated += 1;
            }
        }

        Ok(())
    }

    async fn resolve_content_id(
        &self,
        client: &Arc<dyn CloudProvider>,
        entry: &RemoteEntry,
    ) -> Option<String> {
        if let Some(id) = entry.content_id.as_deref().filter(|c| !c.is_empty()) {
            return Some(id.to_string());
        }
        match client.get_download_identifier(&entry.id).await {
            Ok(id) if !id.is_empty() => Some(id),
            Ok(_) => None,
            Err(err) => {
                debug!(file_id = %entry.id, error = %err, "could not resolve content id");
                None
            }
        }
    }

    /// Mark records deleted whose remote file was not observed this pass.
    async fn sweep_orphans(
        &self,
        task: &SyncTask,
        seen: &HashSet<String>,
        counters: &mut LogCounters,
    ) -> Result<()> {
        if !task.delete_orphans {
            return Ok(());
        }

        for record in self.records.find_active_by_task(&task.id).await? {
            if seen.contains(&record.file_id) {
                continue;
            }
            self.records.mark_deleted(&record.id).await?;
            if task.delete_strm_files {
                remove_pointer(Path::new(&record.strm_path)).await;
            }
            counters.deleted += 1;
        }

        Ok(())
    }

    async fn flush_progress(&self, task: &SyncTask, progress: TaskProgress) {
        if let Err(err) = self.tasks.update_progress(&task.id, progress).await {
            warn!(task_id = %task.id, error = %err, "failed to persist progress");
        }
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Progress {
                task_id: task.id.as_str(),
                current: progress.current_file_index,
                total: progress.total_files,
            }))
            .ok();
    }
}

/// Pointer contents: base URL joined with the playback segment and content id.
pub fn pointer_content(base_url: &str, content_id: &str) -> String {
    format!(
        "{}/{PLAYBACK_PATH_SEGMENT}/{content_id}",
        base_url.trim_end_matches('/')
    )
}

/// Replace the media extension with `.strm`.
fn strm_file_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.{STRM_EXTENSION}"),
        _ => format!("{name}.{STRM_EXTENSION}"),
    }
}

async fn write_pointer(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if let Err(err) = tokio::fs::write(path, content).await {
        warn!(path = %path.display(), error = %err, "failed to write pointer file");
        return Err(err);
    }
    Ok(())
}

/// Best-effort pointer removal; a missing file is fine.
async fn remove_pointer(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to remove pointer file");
        }
    }
}
