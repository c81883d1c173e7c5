//! Scenario tests for the sync layer
//!
//! These run several clients against one in-process backend and check the
//! board they converge on.

use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use kanban_core::store::{CollectionHandler, DocumentHandler, FieldWrites, Fields, StoreResult};
use kanban_core::{
    Auth, AuthUser, BoardSync, CollectionPath, DeliveryMode, Document, DocumentRef,
    DocumentStore, FileStorage, IdAllocation, MemoryBackend, MemoryStore, Profile, Route,
    SessionController, StoreSettings, Subscription, SyncSettings, Theme, ViewState, WatchState,
    Watched, WriteBatch, WriteMode,
};
use serde_json::json;
use tempfile::TempDir;

struct Client {
    auth: Auth,
    store: Arc<MemoryStore>,
    sync: BoardSync,
}

impl Client {
    fn connect(backend: &MemoryBackend, uid: &str, settings: SyncSettings) -> Self {
        let auth = Auth::new();
        let user = AuthUser::new(uid).with_display_name("Ada");
        auth.sign_in(user.clone());
        let store = Arc::new(backend.connect(auth.clone()));
        let sync = BoardSync::new(store.clone(), ViewState::new(), settings);
        sync.start(user).unwrap();
        Self { auth, store, sync }
    }

    fn task_ids(&self, column_id: &str) -> Vec<String> {
        self.sync.view().snapshot().columns[column_id].task_ids.clone()
    }
}

fn deferred_backend() -> MemoryBackend {
    MemoryBackend::with_settings(StoreSettings {
        delivery: DeliveryMode::Deferred,
        ..StoreSettings::default()
    })
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn with_content(content: &str, id_allocation: IdAllocation) -> SyncSettings {
    SyncSettings {
        id_allocation,
        task_content: content.to_string(),
    }
}

/// Store wrapper recording every `set_document` target.
struct RecordingStore {
    inner: Arc<MemoryStore>,
    sets: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn sets_to(&self, path: &str) -> usize {
        self.sets.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

impl DocumentStore for RecordingStore {
    fn client_id(&self) -> kanban_core::store::ClientId {
        self.inner.client_id()
    }

    fn get_document(&self, doc: &DocumentRef) -> StoreResult<Option<Document>> {
        self.inner.get_document(doc)
    }

    fn get_collection(&self, collection: &CollectionPath) -> StoreResult<Vec<Document>> {
        self.inner.get_collection(collection)
    }

    fn set_document(
        &self,
        doc: &DocumentRef,
        writes: FieldWrites,
        mode: WriteMode,
    ) -> StoreResult<()> {
        self.sets.lock().unwrap().push(doc.path());
        self.inner.set_document(doc, writes, mode)
    }

    fn create_document(&self, doc: &DocumentRef, data: Fields) -> StoreResult<()> {
        self.inner.create_document(doc, data)
    }

    fn update_document(&self, doc: &DocumentRef, writes: FieldWrites) -> StoreResult<()> {
        self.inner.update_document(doc, writes)
    }

    fn delete_document(&self, doc: &DocumentRef) -> StoreResult<()> {
        self.inner.delete_document(doc)
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.inner.commit(batch)
    }

    fn watch_document(
        &self,
        doc: &DocumentRef,
        handler: DocumentHandler,
    ) -> StoreResult<Subscription> {
        self.inner.watch_document(doc, handler)
    }

    fn watch_collection(
        &self,
        collection: &CollectionPath,
        handler: CollectionHandler,
    ) -> StoreResult<Subscription> {
        self.inner.watch_collection(collection, handler)
    }
}

#[test]
fn test_single_client_ids_are_sequential() {
    let backend = MemoryBackend::new();
    let client = Client::connect(&backend, "u1", SyncSettings::default());
    let column = client.sync.add_column("Todo").unwrap();

    let added: Vec<String> = (0..5).map(|_| client.sync.add_task(&column).unwrap()).collect();

    assert_eq!(added, ids(&["task-1", "task-2", "task-3", "task-4", "task-5"]));
    assert_eq!(client.task_ids(&column), added);
}

#[test]
fn test_default_documents_written_once_per_session() {
    let backend = deferred_backend();
    let auth = Auth::new();
    let user = AuthUser::new("u1").with_display_name("Ada");
    auth.sign_in(user.clone());
    let laptop = Arc::new(backend.connect(auth.clone()));
    let recording = Arc::new(RecordingStore {
        inner: Arc::clone(&laptop),
        sets: Mutex::new(Vec::new()),
    });
    let sync = BoardSync::new(recording.clone(), ViewState::new(), SyncSettings::default());
    sync.start(user).unwrap();

    // The absent snapshots are handled while offline, so the default
    // writes are queued instead of landing.
    laptop.set_online(false);
    backend.flush();
    assert_eq!(laptop.pending_writes(), 2);

    // A second device touches the profile so the laptop's listener is
    // caught up with another absent snapshot on reconnect.
    let phone_auth = Auth::new();
    phone_auth.sign_in(AuthUser::new("u1"));
    let phone = backend.connect(phone_auth);
    let profile = DocumentRef::parse("users/u1").unwrap();
    phone
        .set_document(&profile, FieldWrites::new().set("firstName", "Tmp"), WriteMode::Merge)
        .unwrap();
    phone.delete_document(&profile).unwrap();

    laptop.set_online(true);
    backend.flush();

    assert_eq!(recording.sets_to("users/u1"), 1);
    assert_eq!(recording.sets_to("boards/u1"), 1);
    assert_eq!(sync.view().snapshot().user, Profile::from_display_name("Ada"));
    assert_eq!(sync.watch_state(Watched::Profile), WatchState::Live);
}

#[test]
fn test_fresh_identity_gets_default_documents() {
    let backend = MemoryBackend::new();
    let client = Client::connect(&backend, "fresh", SyncSettings::default());

    let profile = client
        .store
        .get_document(&DocumentRef::parse("users/fresh").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(
        serde_json::Value::Object(profile.data),
        json!({"firstName": "Ada", "lastName": "", "theme": "light"})
    );
    let board = client
        .store
        .get_document(&DocumentRef::parse("boards/fresh").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(serde_json::Value::Object(board.data), json!({"columnOrder": []}));
}

/// Two devices of one user whose views both stop at `task-3`.
fn two_devices(a: SyncSettings, b: SyncSettings) -> (MemoryBackend, Client, Client, String) {
    let backend = deferred_backend();
    let first = Client::connect(&backend, "u1", a);
    let second = Client::connect(&backend, "u1", b);
    backend.flush();

    let column = first.sync.add_column("Todo").unwrap();
    backend.flush();
    for _ in 0..3 {
        first.sync.add_task(&column).unwrap();
    }
    backend.flush();
    assert_eq!(second.task_ids(&column), ids(&["task-1", "task-2", "task-3"]));

    (backend, first, second, column)
}

#[test]
fn test_concurrent_add_task_reserved_ids_do_not_collide() {
    let (backend, first, second, column) = two_devices(
        with_content("from first", IdAllocation::Reserved),
        with_content("from second", IdAllocation::Reserved),
    );

    let a = first.sync.add_task(&column).unwrap();
    let b = second.sync.add_task(&column).unwrap();
    backend.flush();

    assert_eq!((a.as_str(), b.as_str()), ("task-4", "task-5"));
    let view = first.sync.view().snapshot();
    assert_eq!(view.tasks["task-4"].content, "from first");
    assert_eq!(view.tasks["task-5"].content, "from second");
    assert_eq!(
        view.columns[&column].task_ids,
        ids(&["task-1", "task-2", "task-3", "task-4", "task-5"])
    );
    assert_eq!(second.sync.view().snapshot(), view);
}

#[test]
fn test_concurrent_add_task_optimistic_ids_collide() {
    let (backend, first, second, column) = two_devices(
        with_content("from first", IdAllocation::Optimistic),
        with_content("from second", IdAllocation::Optimistic),
    );

    let a = first.sync.add_task(&column).unwrap();
    let b = second.sync.add_task(&column).unwrap();
    backend.flush();

    assert_eq!(a, "task-4");
    assert_eq!(b, "task-4");
    let view = first.sync.view().snapshot();
    assert_eq!(view.tasks["task-4"].content, "from second");
    assert_eq!(
        view.columns[&column].task_ids,
        ids(&["task-1", "task-2", "task-3", "task-4"])
    );
}

#[test]
fn test_move_task_between_columns_keeps_relative_order() {
    let backend = MemoryBackend::new();
    let client = Client::connect(&backend, "u1", SyncSettings::default());
    let a = client.sync.add_column("A").unwrap();
    let b = client.sync.add_column("B").unwrap();
    for _ in 0..3 {
        client.sync.add_task(&a).unwrap();
    }
    for _ in 0..3 {
        client.sync.add_task(&b).unwrap();
    }
    assert_eq!(client.task_ids(&a), ids(&["task-1", "task-2", "task-3"]));
    assert_eq!(client.task_ids(&b), ids(&["task-4", "task-5", "task-6"]));

    client.sync.move_task("task-1", &a, &b, 2).unwrap();

    assert_eq!(client.task_ids(&a), ids(&["task-2", "task-3"]));
    assert_eq!(client.task_ids(&b), ids(&["task-4", "task-5", "task-1", "task-6"]));
}

#[test]
fn test_delete_column_cascades() {
    let backend = MemoryBackend::new();
    let client = Client::connect(&backend, "u1", SyncSettings::default());
    let doomed = client.sync.add_column("Doomed").unwrap();
    let kept = client.sync.add_column("Kept").unwrap();
    client.sync.add_task(&doomed).unwrap();
    client.sync.add_task(&doomed).unwrap();
    client.sync.add_task(&kept).unwrap();

    client.sync.delete_column(&doomed).unwrap();

    let view = client.sync.view().snapshot();
    assert_eq!(view.column_order, vec![kept.clone()]);
    let reachable: Vec<&String> = view.columns.values().flat_map(|c| &c.task_ids).collect();
    assert!(!reachable.iter().any(|id| *id == "task-1" || *id == "task-2"));
    let tasks = client
        .store
        .get_collection(&CollectionPath::new("boards/u1/tasks").unwrap())
        .unwrap();
    assert_eq!(tasks.len(), 1);
}

#[test]
fn test_view_tolerates_orphans() {
    let backend = MemoryBackend::new();
    let client = Client::connect(&backend, "u1", SyncSettings::default());
    let column = client.sync.add_column("Todo").unwrap();
    let task = client.sync.add_task(&column).unwrap();

    // Another writer leaves dangling references behind.
    let mut batch = WriteBatch::new();
    batch
        .delete(DocumentRef::parse(&format!("boards/u1/tasks/{}", task)).unwrap())
        .update(
            DocumentRef::parse("boards/u1").unwrap(),
            FieldWrites::new().array_union("columnOrder", "column-9"),
        );
    client.store.commit(batch).unwrap();

    let view = client.sync.view().snapshot();
    let resolved = view.resolve();
    assert_eq!(resolved.len(), 1);
    assert!(resolved[0].tasks.is_empty());
    assert_eq!(view.orphans().len(), 2);
}

#[test]
fn test_array_operations_through_the_trait() {
    let backend = MemoryBackend::new();
    let client = Client::connect(&backend, "u1", SyncSettings::default());
    let board = DocumentRef::parse("boards/u1").unwrap();
    let store: &dyn DocumentStore = client.store.as_ref();

    store.append_to_array_field(&board, "columnOrder", json!("x")).unwrap();
    store.append_to_array_field(&board, "columnOrder", json!("x")).unwrap();
    store.remove_from_array_field(&board, "columnOrder", json!("y")).unwrap();

    assert_eq!(client.sync.view().snapshot().column_order, ids(&["x"]));
}

#[test]
fn test_offline_edits_replay_for_every_client() {
    let backend = MemoryBackend::new();
    let laptop = Client::connect(&backend, "u1", SyncSettings::default());
    let phone = Client::connect(&backend, "u1", SyncSettings::default());
    let column = laptop.sync.add_column("Todo").unwrap();
    assert!(phone.sync.view().snapshot().columns.contains_key(&column));

    laptop.store.set_online(false);
    laptop.sync.edit_column_title(&column, "Offline title").unwrap();
    let offline_task = laptop.sync.add_task(&column).unwrap();
    assert!(phone.sync.view().snapshot().tasks.is_empty());

    laptop.store.set_online(true);

    let view = phone.sync.view().snapshot();
    assert_eq!(view.columns[&column].title, "Offline title");
    assert_eq!(view.columns[&column].task_ids, vec![offline_task.clone()]);
    assert!(view.tasks.contains_key(&offline_task));
    assert_eq!(laptop.sync.view().snapshot(), view);
}

#[test]
fn test_offline_task_losing_its_id_leaves_no_reference() {
    let backend = MemoryBackend::new();
    let laptop = Client::connect(&backend, "u1", SyncSettings::default());
    let phone = Client::connect(&backend, "u1", SyncSettings::default());
    let a = laptop.sync.add_column("A").unwrap();
    let b = laptop.sync.add_column("B").unwrap();

    laptop.store.set_online(false);
    let offline = laptop.sync.add_task(&a).unwrap();
    let online = phone.sync.add_task(&b).unwrap();
    assert_eq!(offline, online);

    // The queued create now collides, so its column update is dropped too.
    laptop.store.set_online(true);

    let view = phone.sync.view().snapshot();
    assert!(view.columns[&a].task_ids.is_empty());
    assert_eq!(view.columns[&b].task_ids, vec![online.clone()]);
    let referencing: Vec<&String> = view
        .columns
        .values()
        .filter(|c| c.task_ids.contains(&online))
        .map(|c| &c.id)
        .collect();
    assert_eq!(referencing, vec![&b]);
    assert_eq!(laptop.sync.view().snapshot(), view);
    assert_eq!(laptop.store.pending_writes(), 0);
}

#[test]
fn test_controller_owning_the_only_store_handle_tears_down() {
    let backend = MemoryBackend::new();
    let auth = Auth::new();
    let (done, finished) = mpsc::channel();

    let thread_backend = backend.clone();
    let thread_auth = auth.clone();
    std::thread::spawn(move || {
        let store = Arc::new(thread_backend.connect(thread_auth.clone()));
        let sync = Arc::new(BoardSync::new(store, ViewState::new(), SyncSettings::default()));
        let controller = SessionController::attach(&thread_auth, sync);
        thread_auth.sign_in(AuthUser::new("u1"));
        thread_auth.sign_in(AuthUser::new("u2"));
        let route = controller.route();
        drop(controller);
        let _ = done.send(route);
    });

    let route = finished
        .recv_timeout(Duration::from_secs(10))
        .expect("dropping the controller did not return");
    assert_eq!(route, Route::Board);
    assert_eq!(backend.listener_count(), 0);

    // The auth registry is still usable after the teardown.
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let _watch = auth.on_auth_state_changed(move |user| {
        log.lock().unwrap().push(user.is_some());
    });
    auth.sign_out();
    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
}

#[test]
fn test_sign_out_through_controller() {
    let backend = MemoryBackend::new();
    let auth = Auth::new();
    let store = Arc::new(backend.connect(auth.clone()));
    let sync = Arc::new(BoardSync::new(store, ViewState::new(), SyncSettings::default()));
    let controller = SessionController::attach(&auth, Arc::clone(&sync));

    let errors = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&errors);
    auth.sign_in(AuthUser::new("u1").with_display_name("Ada"));
    let watcher = backend.connect(auth.clone());
    let _subscription = watcher
        .watch_document(
            &DocumentRef::parse("boards/u1").unwrap(),
            Box::new(move |result| {
                if result.is_err() {
                    *counter.lock().unwrap() += 1;
                }
            }),
        )
        .unwrap();
    assert_eq!(controller.route(), Route::Board);

    auth.sign_out();

    assert_eq!(controller.route(), Route::SignIn);
    assert_eq!(*errors.lock().unwrap(), 1);
    assert_eq!(backend.listener_count(), 0);
    let states: BTreeMap<Watched, WatchState> = sync.watch_states();
    assert!(states.values().all(|s| *s == WatchState::Unsubscribed));
    assert_eq!(sync.add_column("Todo"), Err(kanban_core::SyncError::NotStarted));
}

#[test]
fn test_board_survives_restart_through_file_storage() {
    let temp = TempDir::new().unwrap();
    let storage = FileStorage::new(temp.path());
    {
        let backend = MemoryBackend::new();
        let client = Client::connect(&backend, "u1", SyncSettings::default());
        let column = client.sync.add_column("Todo").unwrap();
        client.sync.add_task(&column).unwrap();
        client
            .sync
            .set_profile(&kanban_core::ProfileUpdate {
                theme: Some(Theme::Dark),
                ..Default::default()
            })
            .unwrap();
        storage.save_from(&backend).unwrap();
        client.auth.sign_out();
    }

    let backend = MemoryBackend::new();
    storage.load_into(&backend).unwrap();
    let client = Client::connect(&backend, "u1", SyncSettings::default());

    let view = client.sync.view().snapshot();
    assert_eq!(view.column_order, ids(&["column-1"]));
    assert_eq!(view.columns["column-1"].task_ids, ids(&["task-1"]));
    assert_eq!(view.user.theme, Theme::Dark);
    assert_eq!(client.sync.add_task("column-1").unwrap(), "task-2");
}
