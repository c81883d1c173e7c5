//! Board synchronization session.
//!
//! While a session runs, four listeners feed the [`ViewState`]: the
//! profile, the board, and the column and task collections. Mutations are
//! fire-and-forget writes; the view catches up through the next snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::auth::AuthUser;
use crate::models::{next_sequence, Board, Column, IdKind, Profile, ProfileUpdate, Task};
use crate::path::{DocumentRef, PathError, UserPaths};
use crate::store::{
    DocumentSnapshot, DocumentStore, FieldWrites, Fields, QuerySnapshot, StoreError, StoreResult,
    WriteBatch, WriteMode,
};
use crate::subscription::{lock, Subscription};
use crate::view::ViewState;

use super::drag::{place, DragKind, DragResult};
use super::error::SyncError;
use super::settings::{IdAllocation, SyncSettings};

/// Candidate ids tried before giving up on a reserved allocation.
const MAX_ID_ATTEMPTS: usize = 16;

/// A document or collection watched by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Watched {
    Profile,
    Board,
    Columns,
    Tasks,
}

impl Watched {
    pub const ALL: [Watched; 4] = [
        Watched::Profile,
        Watched::Board,
        Watched::Columns,
        Watched::Tasks,
    ];
}

/// Lifecycle of one watched collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchState {
    #[default]
    Unsubscribed,
    /// Listener registered, no snapshot yet.
    Subscribing,
    Live,
    /// The listener was terminated, usually by losing the identity.
    Error,
}

/// State shared with snapshot handlers.
#[derive(Default)]
struct Shared {
    states: Mutex<BTreeMap<Watched, WatchState>>,
    /// Default documents already written this session.
    defaults: Mutex<HashSet<Watched>>,
}

impl Shared {
    fn set_all(&self, state: WatchState) {
        let mut states = lock(&self.states);
        for watched in Watched::ALL {
            states.insert(watched, state);
        }
    }

    fn set(&self, watched: Watched, state: WatchState) {
        lock(&self.states).insert(watched, state);
    }

    /// True the first time it is called for `watched` in a session.
    fn claim_default(&self, watched: Watched) -> bool {
        lock(&self.defaults).insert(watched)
    }
}

struct Session {
    user: AuthUser,
    paths: UserPaths,
    subscriptions: Vec<Subscription>,
    /// Highest sequence number issued per id kind.
    last_issued: HashMap<IdKind, u64>,
}

/// Everything a snapshot handler needs.
#[derive(Clone)]
struct SnapshotContext {
    store: Arc<dyn DocumentStore>,
    view: ViewState,
    shared: Arc<Shared>,
    user: AuthUser,
    paths: UserPaths,
}

impl SnapshotContext {
    fn on_profile(&self, result: Result<&DocumentSnapshot, &StoreError>) {
        let Some(snapshot) = self.accept(Watched::Profile, result) else {
            return;
        };
        match &snapshot.document {
            Some(document) => match Profile::from_document(document) {
                Ok(profile) => self.view.apply_profile(profile),
                Err(e) => tracing::warn!("Ignoring profile snapshot: {}", e),
            },
            None => {
                if self.shared.claim_default(Watched::Profile) {
                    let name = self.user.display_name.clone().unwrap_or_default();
                    tracing::info!(uid = %self.user.uid, "Creating default profile");
                    let result = self.store.set_document(
                        &self.paths.profile,
                        Profile::from_display_name(&name).to_writes(),
                        WriteMode::Merge,
                    );
                    self.handler_write(Watched::Profile, result);
                }
            }
        }
    }

    fn on_board(&self, result: Result<&DocumentSnapshot, &StoreError>) {
        let Some(snapshot) = self.accept(Watched::Board, result) else {
            return;
        };
        match &snapshot.document {
            Some(document) => match Board::from_document(document) {
                Ok(board) => self.view.apply_board(board.column_order),
                Err(e) => tracing::warn!("Ignoring board snapshot: {}", e),
            },
            None => {
                if self.shared.claim_default(Watched::Board) {
                    tracing::info!(uid = %self.user.uid, "Creating empty board");
                    let result = self.store.set_document(
                        &self.paths.board,
                        Board::default_writes(),
                        WriteMode::Merge,
                    );
                    self.handler_write(Watched::Board, result);
                }
            }
        }
    }

    fn on_columns(&self, result: Result<&QuerySnapshot, &StoreError>) {
        let Some(snapshot) = self.accept(Watched::Columns, result) else {
            return;
        };
        let columns = decode_all(snapshot, Column::from_document, |column| column.id.clone());
        self.view.apply_columns(columns);
    }

    fn on_tasks(&self, result: Result<&QuerySnapshot, &StoreError>) {
        let Some(snapshot) = self.accept(Watched::Tasks, result) else {
            return;
        };
        let tasks = decode_all(snapshot, Task::from_document, |task| task.id.clone());
        self.view.apply_tasks(tasks);
    }

    /// Track the watch state for a delivery and unwrap the snapshot.
    fn accept<'a, T>(&self, watched: Watched, result: Result<&'a T, &StoreError>) -> Option<&'a T> {
        match result {
            Ok(snapshot) => {
                tracing::debug!(?watched, "Snapshot delivered");
                self.shared.set(watched, WatchState::Live);
                Some(snapshot)
            }
            Err(StoreError::Unauthenticated) => {
                tracing::info!(?watched, "Listener ended: signed out");
                self.shared.set(watched, WatchState::Error);
                None
            }
            Err(e) => {
                tracing::warn!(?watched, "Listener failed: {}", e);
                self.shared.set(watched, WatchState::Error);
                None
            }
        }
    }

    fn handler_write(&self, watched: Watched, result: StoreResult<()>) {
        match result {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                tracing::debug!(?watched, "Default write queued: {}", e);
            }
            Err(StoreError::Unauthenticated) => {
                tracing::warn!(?watched, "Default write rejected: signed out");
                self.shared.set(watched, WatchState::Error);
            }
            Err(e) => tracing::warn!(?watched, "Default write failed: {}", e),
        }
    }
}

fn decode_all<T>(
    snapshot: &QuerySnapshot,
    decode: impl Fn(&crate::store::Document) -> StoreResult<T>,
    key: impl Fn(&T) -> String,
) -> BTreeMap<String, T> {
    let mut decoded = BTreeMap::new();
    for document in &snapshot.documents {
        match decode(document) {
            Ok(value) => {
                decoded.insert(key(&value), value);
            }
            Err(e) => tracing::warn!("Skipping document: {}", e),
        }
    }
    decoded
}

/// Interpret the result of a fire-and-forget write.
fn fire(result: StoreResult<()>) -> Result<(), SyncError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_transient() => {
            tracing::debug!("Write queued until reconnect: {}", e);
            Ok(())
        }
        Err(e) => Err(store_error(e)),
    }
}

fn store_error(err: StoreError) -> SyncError {
    match err {
        StoreError::Unauthenticated => SyncError::Unauthenticated,
        other => SyncError::Store(other),
    }
}

/// Client-side synchronization between the document store and a
/// [`ViewState`].
pub struct BoardSync {
    store: Arc<dyn DocumentStore>,
    view: ViewState,
    settings: SyncSettings,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl BoardSync {
    pub fn new(store: Arc<dyn DocumentStore>, view: ViewState, settings: SyncSettings) -> Self {
        Self {
            store,
            view,
            settings,
            shared: Arc::new(Shared::default()),
            session: Mutex::new(None),
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_started(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// Identity of the running session.
    pub fn user(&self) -> Option<AuthUser> {
        lock(&self.session).as_ref().map(|s| s.user.clone())
    }

    pub fn watch_state(&self, watched: Watched) -> WatchState {
        lock(&self.shared.states)
            .get(&watched)
            .copied()
            .unwrap_or_default()
    }

    pub fn watch_states(&self) -> BTreeMap<Watched, WatchState> {
        Watched::ALL
            .into_iter()
            .map(|watched| (watched, self.watch_state(watched)))
            .collect()
    }

    /// Start watching the board of `user`. A running session is stopped
    /// first.
    pub fn start(&self, user: AuthUser) -> Result<(), SyncError> {
        self.stop();

        let paths = UserPaths::for_uid(&user.uid)?;
        tracing::info!(uid = %user.uid, "Starting board sync");
        self.shared.set_all(WatchState::Subscribing);

        let context = SnapshotContext {
            store: Arc::clone(&self.store),
            view: self.view.clone(),
            shared: Arc::clone(&self.shared),
            user: user.clone(),
            paths: paths.clone(),
        };
        let subscriptions = match self.subscribe(&context) {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::warn!(uid = %user.uid, "Could not start board sync: {}", e);
                self.shared.set_all(WatchState::Error);
                return Err(store_error(e));
            }
        };

        *lock(&self.session) = Some(Session {
            user,
            paths,
            subscriptions,
            last_issued: HashMap::new(),
        });
        Ok(())
    }

    fn subscribe(&self, context: &SnapshotContext) -> StoreResult<Vec<Subscription>> {
        let mut subscriptions = Vec::with_capacity(Watched::ALL.len());

        let ctx = context.clone();
        subscriptions.push(
            self.store
                .watch_document(&context.paths.profile, Box::new(move |r| ctx.on_profile(r)))?,
        );
        let ctx = context.clone();
        subscriptions.push(
            self.store
                .watch_document(&context.paths.board, Box::new(move |r| ctx.on_board(r)))?,
        );
        let ctx = context.clone();
        subscriptions.push(
            self.store
                .watch_collection(&context.paths.columns, Box::new(move |r| ctx.on_columns(r)))?,
        );
        let ctx = context.clone();
        subscriptions.push(
            self.store
                .watch_collection(&context.paths.tasks, Box::new(move |r| ctx.on_tasks(r)))?,
        );

        Ok(subscriptions)
    }

    /// Cancel every listener of the running session.
    pub fn stop(&self) {
        let session = lock(&self.session).take();
        if let Some(session) = session {
            tracing::info!(uid = %session.user.uid, "Stopping board sync");
            for subscription in session.subscriptions {
                subscription.cancel();
            }
        }
        lock(&self.shared.defaults).clear();
        self.shared.set_all(WatchState::Unsubscribed);
    }

    fn paths(&self) -> Result<UserPaths, SyncError> {
        lock(&self.session)
            .as_ref()
            .map(|s| s.paths.clone())
            .ok_or(SyncError::NotStarted)
    }

    fn last_issued(&self, kind: IdKind) -> u64 {
        lock(&self.session)
            .as_ref()
            .and_then(|s| s.last_issued.get(&kind).copied())
            .unwrap_or(0)
    }

    fn record_issued(&self, kind: IdKind, n: u64) {
        if let Some(session) = lock(&self.session).as_mut() {
            let last = session.last_issued.entry(kind).or_insert(0);
            *last = (*last).max(n);
        }
    }

    /// Write a new document under the next free `kind` id and append the id
    /// to `field` of `parent` in the same batch, so a failed create never
    /// leaves a reference behind.
    fn allocate(
        &self,
        kind: IdKind,
        taken: &[String],
        doc_for: impl Fn(&str) -> Result<DocumentRef, PathError>,
        data_for: impl Fn(&str) -> Fields,
        parent: &DocumentRef,
        field: &str,
    ) -> Result<String, SyncError> {
        let floor = self.last_issued(kind).saturating_add(1);
        let mut n = next_sequence(taken.iter().map(String::as_str)).max(floor);

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = kind.format(n);
            let doc = doc_for(&id)?;
            let mut batch = WriteBatch::new();
            match self.settings.id_allocation {
                IdAllocation::Reserved => batch.create(doc, data_for(&id)),
                IdAllocation::Optimistic => {
                    batch.set(doc, FieldWrites::from(data_for(&id)), WriteMode::Merge)
                }
            };
            batch.update(
                parent.clone(),
                FieldWrites::new().array_union(field, Value::from(id.as_str())),
            );

            match self.store.commit(batch) {
                Err(StoreError::AlreadyExists(path)) => {
                    tracing::debug!("{} is taken, trying the next id", path);
                    n = n.saturating_add(1);
                }
                other => {
                    fire(other)?;
                    self.record_issued(kind, n);
                    return Ok(id);
                }
            }
        }
        Err(SyncError::IdsExhausted(kind, MAX_ID_ATTEMPTS))
    }

    /// Add a task at the bottom of a column. Returns the new task id.
    pub fn add_task(&self, column_id: &str) -> Result<String, SyncError> {
        let paths = self.paths()?;
        let view = self.view.snapshot();
        if !view.columns.contains_key(column_id) {
            return Err(SyncError::ColumnNotFound(column_id.to_string()));
        }

        let taken: Vec<String> = view
            .tasks
            .keys()
            .chain(view.columns.values().flat_map(|c| c.task_ids.iter()))
            .cloned()
            .collect();
        let content = self.settings.task_content.as_str();
        let task_id = self.allocate(
            IdKind::Task,
            &taken,
            |id| paths.task(id),
            |id| Task::new(id, content).to_fields(),
            &paths.column(column_id)?,
            Column::TASK_IDS,
        )?;
        tracing::debug!(%task_id, %column_id, "Added task");
        Ok(task_id)
    }

    /// Add a column at the right end of the board. Returns the new column id.
    pub fn add_column(&self, title: &str) -> Result<String, SyncError> {
        let paths = self.paths()?;
        let view = self.view.snapshot();

        let taken: Vec<String> = view
            .columns
            .keys()
            .chain(view.column_order.iter())
            .cloned()
            .collect();
        let column_id = self.allocate(
            IdKind::Column,
            &taken,
            |id| paths.column(id),
            |id| Column::new(id, title).to_fields(),
            &paths.board,
            Board::COLUMN_ORDER,
        )?;
        tracing::debug!(%column_id, "Added column");
        Ok(column_id)
    }

    /// Rename a column. Nothing is written when the title is unchanged.
    pub fn edit_column_title(&self, column_id: &str, title: &str) -> Result<(), SyncError> {
        let paths = self.paths()?;
        let view = self.view.snapshot();
        let column = view
            .columns
            .get(column_id)
            .ok_or_else(|| SyncError::ColumnNotFound(column_id.to_string()))?;
        if column.title == title {
            return Ok(());
        }
        fire(self.store.set_document(
            &paths.column(column_id)?,
            Column::title_writes(title),
            WriteMode::Merge,
        ))
    }

    pub fn edit_task_content(&self, task_id: &str, content: &str) -> Result<(), SyncError> {
        let paths = self.paths()?;
        let view = self.view.snapshot();
        let task = view
            .tasks
            .get(task_id)
            .ok_or_else(|| SyncError::TaskNotFound(task_id.to_string()))?;
        if task.content == content {
            return Ok(());
        }
        fire(self.store.set_document(
            &paths.task(task_id)?,
            Task::content_writes(content),
            WriteMode::Merge,
        ))
    }

    /// Remove a task from its column and delete it.
    pub fn delete_task(&self, column_id: &str, task_id: &str) -> Result<(), SyncError> {
        let paths = self.paths()?;
        if !self.view.snapshot().columns.contains_key(column_id) {
            return Err(SyncError::ColumnNotFound(column_id.to_string()));
        }
        fire(self.store.remove_from_array_field(
            &paths.column(column_id)?,
            Column::TASK_IDS,
            Value::from(task_id),
        ))?;
        fire(self.store.delete_document(&paths.task(task_id)?))
    }

    /// Delete a column with every task it references.
    ///
    /// Tasks, the column and its `columnOrder` entry are removed by three
    /// separate writes, so other clients may briefly see orphan references.
    pub fn delete_column(&self, column_id: &str) -> Result<(), SyncError> {
        let paths = self.paths()?;
        let view = self.view.snapshot();
        let task_ids = match view.columns.get(column_id) {
            Some(column) => column.task_ids.clone(),
            None if view.column_order.iter().any(|id| id == column_id) => Vec::new(),
            None => return Err(SyncError::ColumnNotFound(column_id.to_string())),
        };

        fire(self.store.batch_delete(&paths.tasks, &task_ids))?;
        fire(self.store.delete_document(&paths.column(column_id)?))?;
        fire(self.store.remove_from_array_field(
            &paths.board,
            Board::COLUMN_ORDER,
            Value::from(column_id),
        ))?;
        tracing::debug!(%column_id, tasks = task_ids.len(), "Deleted column");
        Ok(())
    }

    /// Replace the column order.
    pub fn reorder_columns(&self, new_order: Vec<String>) -> Result<(), SyncError> {
        let paths = self.paths()?;
        let mut seen = HashSet::new();
        for id in &new_order {
            if !seen.insert(id.as_str()) {
                return Err(SyncError::InvalidOrder(id.clone()));
            }
        }
        fire(self.store.set_document(
            &paths.board,
            Board::order_writes(&new_order),
            WriteMode::Merge,
        ))
    }

    /// Move a task to `to_index` (clamped) of column `to`.
    pub fn move_task(
        &self,
        task_id: &str,
        from: &str,
        to: &str,
        to_index: usize,
    ) -> Result<(), SyncError> {
        let paths = self.paths()?;
        let view = self.view.snapshot();
        let source = view
            .columns
            .get(from)
            .ok_or_else(|| SyncError::ColumnNotFound(from.to_string()))?;
        let destination = view
            .columns
            .get(to)
            .ok_or_else(|| SyncError::ColumnNotFound(to.to_string()))?;
        if !source.task_ids.iter().any(|id| id == task_id) {
            return Err(SyncError::TaskNotFound(task_id.to_string()));
        }

        if from == to {
            let mut task_ids = source.task_ids.clone();
            place(&mut task_ids, task_id, to_index);
            if task_ids == source.task_ids {
                return Ok(());
            }
            return fire(self.store.set_document(
                &paths.column(from)?,
                Column::task_ids_writes(&task_ids),
                WriteMode::Merge,
            ));
        }

        let mut source_ids = source.task_ids.clone();
        source_ids.retain(|id| id != task_id);
        let mut destination_ids = destination.task_ids.clone();
        place(&mut destination_ids, task_id, to_index);

        let mut batch = WriteBatch::new();
        batch
            .set(
                paths.column(from)?,
                Column::task_ids_writes(&source_ids),
                WriteMode::Merge,
            )
            .set(
                paths.column(to)?,
                Column::task_ids_writes(&destination_ids),
                WriteMode::Merge,
            );
        fire(self.store.commit(batch))
    }

    /// Apply the end of a drag gesture.
    pub fn on_drag_end(&self, drag: &DragResult) -> Result<(), SyncError> {
        let Some(destination) = drag.destination.as_ref().filter(|_| !drag.is_noop()) else {
            return Ok(());
        };
        match drag.kind {
            DragKind::Column => {
                let mut order = self.view.snapshot().column_order;
                place(&mut order, &drag.draggable_id, destination.index);
                self.reorder_columns(order)
            }
            DragKind::Task => self.move_task(
                &drag.draggable_id,
                &drag.source.droppable_id,
                &destination.droppable_id,
                destination.index,
            ),
        }
    }

    /// Merge the provided profile fields.
    pub fn set_profile(&self, update: &ProfileUpdate) -> Result<(), SyncError> {
        let paths = self.paths()?;
        if update.is_empty() {
            return Ok(());
        }
        fire(self.store.set_document(&paths.profile, update.to_writes(), WriteMode::Merge))
    }
}

impl Drop for BoardSync {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for BoardSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardSync")
            .field("user", &self.user())
            .field("states", &self.watch_states())
            .field("settings", &self.settings)
            .finish()
    }
}
