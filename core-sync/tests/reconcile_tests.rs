//! End-to-end reconciliation tests over an in-memory remote tree and a
//! temporary output directory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use core_runtime::events::EventBus;
use core_store::{
    create_test_pool, Drive, DriveRepository, FileFilter, RecordRepository, RecordStatus,
    SqliteDriveRepository, SqliteRecordRepository, SqliteTaskRepository, SyncTask, TaskRepository,
};
use core_sync::engine::{pointer_content, SyncEngine};
use core_sync::pool::ClientBundle;
use provider_traits::{CloudProvider, EventPage, FileListing, RemoteEntry};
use tempfile::TempDir;

/// Provider over a mutable in-memory folder tree.
struct TreeProvider {
    nodes: Arc<Mutex<HashMap<String, Vec<RemoteEntry>>>>,
}

#[async_trait]
impl CloudProvider for TreeProvider {
    async fn list_files(
        &self,
        node_id: &str,
        limit: u32,
        offset: u64,
    ) -> provider_traits::Result<FileListing> {
        let nodes = self.nodes.lock().unwrap();
        let children = nodes.get(node_id).cloned().unwrap_or_default();
        let total = children.len() as u64;
        let entries = children
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(FileListing { entries, total })
    }

    async fn search_files(&self, _: &str, _: &str) -> provider_traits::Result<Vec<RemoteEntry>> {
        Ok(Vec::new())
    }

    async fn get_download_identifier(&self, file_id: &str) -> provider_traits::Result<String> {
        Ok(format!("resolved-{file_id}"))
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

fn file(id: &str, name: &str, size: u64, content_id: Option<&str>) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: name.to_string(),
        parent_id: None,
        size: Some(size),
        is_folder: false,
        content_id: content_id.map(str::to_string),
        created_at: None,
        modified_at: None,
    }
}

fn folder(id: &str, name: &str) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: name.to_string(),
        parent_id: None,
        size: None,
        is_folder: true,
        content_id: None,
        created_at: None,
        modified_at: None,
    }
}

struct Harness {
    engine: SyncEngine,
    bundle: ClientBundle,
    records: SqliteRecordRepository,
    tasks: SqliteTaskRepository,
    task: SyncTask,
    nodes: Arc<Mutex<HashMap<String, Vec<RemoteEntry>>>>,
    out: TempDir,
}

impl Harness {
    async fn new(configure: impl FnOnce(&mut SyncTask)) -> Self {
        Self::with_page_size(100, configure).await
    }

    async fn with_page_size(page_size: u32, configure: impl FnOnce(&mut SyncTask)) -> Self {
        let db = create_test_pool().await.unwrap();
        let drives = SqliteDriveRepository::new(db.clone());
        let tasks = SqliteTaskRepository::new(db.clone());
        let records = SqliteRecordRepository::new(db.clone());

        let drive = Drive::new("Home", "mockcloud");
        drives.insert(&drive).await.unwrap();

        let out = tempfile::tempdir().unwrap();
        let mut task = SyncTask::new(
            "Movies",
            &drive.id,
            "root",
            out.path().to_string_lossy(),
            "http://media.local:8080",
        );
        configure(&mut task);
        tasks.insert(&task).await.unwrap();

        let nodes: Arc<Mutex<HashMap<String, Vec<RemoteEntry>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let client = Arc::new(TreeProvider {
            nodes: Arc::clone(&nodes),
        }) as Arc<dyn CloudProvider>;

        let engine = SyncEngine::new(
            Arc::new(SqliteTaskRepository::new(db.clone())),
            Arc::new(SqliteRecordRepository::new(db.clone())),
            EventBus::new(64),
            page_size,
        );

        Harness {
            engine,
            bundle: ClientBundle {
                drive_id: drive.id.clone(),
                client,
            },
            records,
            tasks,
            task,
            nodes,
            out,
        }
    }

    fn set_node(&self, node_id: &str, children: Vec<RemoteEntry>) {
        self.nodes
            .lock()
            .unwrap()
            .insert(node_id.to_string(), children);
    }

    async fn run(&self) -> core_store::LogCounters {
        self.engine.reconcile(&self.bundle, &self.task).await.unwrap()
    }

    fn strm_path(&self, rel: &str) -> std::path::PathBuf {
        self.out.path().join(rel)
    }

    async fn active_count(&self) -> u64 {
        self.records.count_active(&self.task.id).await.unwrap()
    }
}

#[tokio::test]
async fn first_pass_creates_pointer_files() {
    let h = Harness::new(|t| t.delete_orphans = true).await;
    h.set_node(
        "root",
        vec![
            file("f1", "alpha.mkv", 100, Some("c1")),
            file("f2", "beta.mp4", 200, Some("c2")),
            file("f3", "gamma.avi", 300, Some("c3")),
        ],
    );

    let counters = h.run().await;
    assert_eq!(counters.scanned, 3);
    assert_eq!(counters.added, 3);
    assert_eq!(counters.updated, 0);
    assert_eq!(counters.deleted, 0);
    assert_eq!(h.active_count().await, 3);

    let content = std::fs::read_to_string(h.strm_path("alpha.strm")).unwrap();
    assert_eq!(content, "http://media.local:8080/play/c1");
}

#[tokio::test]
async fn second_pass_is_idempotent() {
    let h = Harness::new(|t| t.delete_orphans = true).await;
    h.set_node(
        "root",
        vec![
            file("f1", "alpha.mkv", 100, Some("c1")),
            file("f2", "beta.mp4", 200, Some("c2")),
        ],
    );

    h.run().await;
    let counters = h.run().await;

    assert_eq!(counters.added, 0);
    assert_eq!(counters.updated, 0);
    assert_eq!(counters.skipped, 2);
    assert_eq!(counters.deleted, 0);
    assert_eq!(h.active_count().await, 2);
}

#[tokio::test]
async fn add_remove_add_scenario() {
    let h = Harness::new(|t| t.delete_orphans = true).await;
    let three = vec![
        file("f1", "alpha.mkv", 100, Some("c1")),
        file("f2", "beta.mkv", 200, Some("c2")),
        file("f3", "gamma.mkv", 300, Some("c3")),
    ];
    h.set_node("root", three.clone());

    let first = h.run().await;
    assert_eq!(first.added, 3);
    assert_eq!(h.active_count().await, 3);

    // Remove one remote file
    h.set_node("root", three[..2].to_vec());
    let second = h.run().await;
    assert_eq!(second.added, 0);
    assert_eq!(second.deleted, 1);
    assert_eq!(h.active_count().await, 2);

    // Add a fresh one
    let mut four = three[..2].to_vec();
    four.push(file("f4", "delta.mkv", 400, Some("c4")));
    h.set_node("root", four);
    let third = h.run().await;
    assert_eq!(third.added, 1);
    assert_eq!(third.deleted, 0);
    assert_eq!(h.active_count().await, 3);
}

#[tokio::test]
async fn orphan_sweep_removes_exactly_one_pointer_file() {
    let h = Harness::new(|t| {
        t.delete_orphans = true;
        t.delete_strm_files = true;
    })
    .await;
    h.set_node(
        "root",
        vec![
            file("f1", "alpha.mkv", 100, Some("c1")),
            file("f2", "beta.mkv", 200, Some("c2")),
        ],
    );
    h.run().await;
    assert!(h.strm_path("alpha.strm").exists());
    assert!(h.strm_path("beta.strm").exists());

    h.set_node("root", vec![file("f2", "beta.mkv", 200, Some("c2"))]);
    let counters = h.run().await;

    assert_eq!(counters.deleted, 1);
    assert!(!h.strm_path("alpha.strm").exists());
    assert!(h.strm_path("beta.strm").exists());
}

#[tokio::test]
async fn orphans_are_kept_when_flag_is_off() {
    let h = Harness::new(|t| t.delete_orphans = false).await;
    h.set_node("root", vec![file("f1", "alpha.mkv", 100, Some("c1"))]);
    h.run().await;

    h.set_node("root", Vec::new());
    let counters = h.run().await;

    assert_eq!(counters.deleted, 0);
    assert_eq!(h.active_count().await, 1);
    assert!(h.strm_path("alpha.strm").exists());
}

#[tokio::test]
async fn empty_source_orphans_every_record() {
    let h = Harness::new(|t| {
        t.delete_orphans = true;
        t.delete_strm_files = true;
    })
    .await;
    h.set_node(
        "root",
        vec![
            file("f1", "alpha.mkv", 100, Some("c1")),
            file("f2", "beta.mkv", 200, Some("c2")),
        ],
    );
    h.run().await;

    h.set_node("root", Vec::new());
    let counters = h.run().await;

    assert_eq!(counters.scanned, 0);
    assert_eq!(counters.added, 0);
    assert_eq!(counters.deleted, 2);
    assert_eq!(h.active_count().await, 0);
}

#[tokio::test]
async fn unchanged_pointer_is_not_rewritten() {
    let h = Harness::new(|t| t.overwrite_strm = false).await;
    h.set_node("root", vec![file("f1", "alpha.mkv", 100, Some("c1"))]);
    h.run().await;

    // Scribble a marker into the pointer; an untouched file keeps it
    let path = h.strm_path("alpha.strm");
    std::fs::write(&path, "marker").unwrap();

    let counters = h.run().await;
    assert_eq!(counters.updated, 0);
    assert_eq!(counters.skipped, 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "marker");
}

#[tokio::test]
async fn overwrite_flag_rewrites_unchanged_pointer() {
    let h = Harness::new(|t| t.overwrite_strm = true).await;
    h.set_node("root", vec![file("f1", "alpha.mkv", 100, Some("c1"))]);
    h.run().await;

    let path = h.strm_path("alpha.strm");
    std::fs::write(&path, "marker").unwrap();

    let counters = h.run().await;
    assert_eq!(counters.updated, 1);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        pointer_content("http://media.local:8080", "c1")
    );
}

#[tokio::test]
async fn changed_content_id_updates_record_and_file() {
    let h = Harness::new(|_| {}).await;
    h.set_node("root", vec![file("f1", "alpha.mkv", 100, Some("c1"))]);
    h.run().await;

    h.set_node("root", vec![file("f1", "alpha.mkv", 100, Some("c9"))]);
    let counters = h.run().await;

    assert_eq!(counters.updated, 1);
    assert_eq!(counters.added, 0);
    assert_eq!(
        std::fs::read_to_string(h.strm_path("alpha.strm")).unwrap(),
        "http://media.local:8080/play/c9"
    );

    let record = h
        .records
        .find_active_by_file(&h.task.id, "f1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.content_id, "c9");
    assert_eq!(record.status, RecordStatus::Active);
}

#[tokio::test]
async fn preserve_structure_mirrors_remote_tree() {
    let h = Harness::new(|t| t.preserve_structure = true).await;
    h.set_node(
        "root",
        vec![
            folder("d1", "Season 1"),
            file("f0", "special.mkv", 50, Some("c0")),
        ],
    );
    h.set_node("d1", vec![file("f1", "episode.mkv", 100, Some("c1"))]);

    let counters = h.run().await;
    assert_eq!(counters.added, 2);
    assert!(h.strm_path("special.strm").exists());
    assert!(h.strm_path("Season 1/episode.strm").exists());
}

#[tokio::test]
async fn flat_layout_resolves_collisions_first_seen_wins() {
    let h = Harness::new(|t| t.preserve_structure = false).await;
    h.set_node(
        "root",
        vec![folder("d1", "a"), folder("d2", "b")],
    );
    h.set_node("d1", vec![file("f1", "movie.mkv", 100, Some("c1"))]);
    h.set_node("d2", vec![file("f2", "movie.mkv", 200, Some("c2"))]);

    let counters = h.run().await;
    assert_eq!(counters.added, 1);
    assert_eq!(counters.skipped, 1);
    assert_eq!(
        std::fs::read_to_string(h.strm_path("movie.strm")).unwrap(),
        "http://media.local:8080/play/c1"
    );
}

#[tokio::test]
async fn zero_byte_and_unresolvable_files_are_skipped() {
    let h = Harness::new(|_| {}).await;
    h.set_node(
        "root",
        vec![
            file("f1", "empty.mkv", 0, Some("c1")),
            // No inline content id: resolved through get_download_identifier
            file("f2", "late.mkv", 100, None),
            file("f3", "fine.mkv", 100, Some("c3")),
        ],
    );

    let counters = h.run().await;
    assert_eq!(counters.scanned, 3);
    assert_eq!(counters.added, 2);
    assert_eq!(counters.skipped, 1);
    assert_eq!(
        std::fs::read_to_string(h.strm_path("late.strm")).unwrap(),
        "http://media.local:8080/play/resolved-f2"
    );
}

#[tokio::test]
async fn filter_excludes_non_matching_extensions() {
    let h = Harness::new(|t| {
        t.filter = FileFilter {
            include_video: true,
            include_audio: false,
            custom_extensions: Vec::new(),
        };
    })
    .await;
    h.set_node(
        "root",
        vec![
            file("f1", "movie.mkv", 100, Some("c1")),
            file("f2", "song.mp3", 100, Some("c2")),
            file("f3", "notes.txt", 100, Some("c3")),
            file("f4", "README", 100, Some("c4")),
        ],
    );

    let counters = h.run().await;
    assert_eq!(counters.scanned, 4);
    assert_eq!(counters.added, 1);
    assert!(h.strm_path("movie.strm").exists());
    assert!(!h.strm_path("song.strm").exists());
}

#[tokio::test]
async fn custom_extension_list_replaces_defaults() {
    let h = Harness::new(|t| {
        t.filter.custom_extensions = vec!["iso".to_string()];
    })
    .await;
    h.set_node(
        "root",
        vec![
            file("f1", "movie.mkv", 100, Some("c1")),
            file("f2", "image.iso", 100, Some("c2")),
        ],
    );

    let counters = h.run().await;
    assert_eq!(counters.added, 1);
    assert!(h.strm_path("image.strm").exists());
    assert!(!h.strm_path("movie.strm").exists());
}

#[tokio::test]
async fn pagination_walks_the_whole_listing() {
    let h = Harness::with_page_size(2, |t| t.delete_orphans = true).await;
    h.set_node(
        "root",
        (0..5)
            .map(|i| file(&format!("f{i}"), &format!("m{i}.mkv"), 100, Some("c")))
            .collect(),
    );

    let counters = h.run().await;
    assert_eq!(counters.scanned, 5);
    assert_eq!(counters.added, 5);
    assert_eq!(h.active_count().await, 5);
}

#[tokio::test]
async fn progress_counters_accumulate_lazily() {
    let h = Harness::new(|_| {}).await;
    h.set_node(
        "root",
        vec![
            folder("d1", "inner"),
            file("f0", "top.mkv", 100, Some("c0")),
        ],
    );
    h.set_node(
        "d1",
        (0..12)
            .map(|i| file(&format!("g{i}"), &format!("n{i}.mkv"), 100, Some("c")))
            .collect(),
    );

    h.run().await;

    let task = h.tasks.find_by_id(&h.task.id).await.unwrap().unwrap();
    assert_eq!(task.progress.total_files, 13);
    assert_eq!(task.progress.current_file_index, 13);
}

#[tokio::test]
async fn deleted_records_keep_their_row_for_history() {
    let h = Harness::new(|t| t.delete_orphans = true).await;
    h.set_node("root", vec![file("f1", "alpha.mkv", 100, Some("c1"))]);
    h.run().await;

    h.set_node("root", Vec::new());
    h.run().await;

    let all = h.records.find_by_task(&h.task.id).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, RecordStatus::Deleted);
}

#[tokio::test]
async fn deep_nesting_is_traversed() {
    let h = Harness::new(|t| t.preserve_structure = true).await;
    h.set_node("root", vec![folder("d1", "a")]);
    h.set_node("d1", vec![folder("d2", "b")]);
    h.set_node("d2", vec![file("f1", "deep.mkv", 100, Some("c1"))]);

    let counters = h.run().await;
    assert_eq!(counters.added, 1);
    assert!(h.strm_path("a/b/deep.strm").exists());
    assert!(Path::new(&h.strm_path("a/b")).is_dir());
}
