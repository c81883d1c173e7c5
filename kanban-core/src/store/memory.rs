//! In-process document store.
//!
//! [`MemoryBackend`] plays the hosted database: it owns every document and
//! every listener, commits writes atomically and fans snapshots out to the
//! listeners of all connected clients. [`MemoryStore`] is one client
//! connection: it scopes operations to its signed-in identity, and it can be
//! taken offline to exercise the reconnect path.
//!
//! Snapshots are queued while the backend lock is held and delivered after
//! it is released, so handlers are free to write back into the store.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::auth::Auth;
use crate::path::{CollectionPath, DocumentRef};
use crate::subscription::{lock, Subscription};

use super::batch::{WriteBatch, WriteOp};
use super::error::{StoreError, StoreResult};
use super::fields::{FieldWrites, Fields};
use super::{
    ClientId, CollectionHandler, Document, DocumentHandler, DocumentSnapshot, DocumentStore,
    QuerySnapshot, SnapshotMetadata, WriteMode,
};

/// When snapshots reach listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Deliver before the write call returns.
    #[default]
    Immediate,
    /// Hold snapshots until [`MemoryBackend::flush`] is called.
    Deferred,
}

/// Backend behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreSettings {
    pub delivery: DeliveryMode,
    /// Fail deletes of missing documents with `NotFound`.
    pub enforce_existence: bool,
}

#[derive(Clone)]
enum Handler {
    Document(Arc<Mutex<DocumentHandler>>),
    Collection(Arc<Mutex<CollectionHandler>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Document(DocumentRef),
    Collection(CollectionPath),
}

struct Listener {
    client: ClientId,
    target: Target,
    handler: Handler,
}

enum Event {
    Document(DocumentSnapshot),
    Collection(QuerySnapshot),
    Error(StoreError),
}

struct Delivery {
    listener: u64,
    handler: Handler,
    event: Event,
}

impl Delivery {
    fn dispatch(&self) {
        match (&self.handler, &self.event) {
            (Handler::Document(handler), Event::Document(snapshot)) => {
                let mut handler = lock(handler);
                (&mut *handler)(Ok(snapshot));
            }
            (Handler::Document(handler), Event::Error(err)) => {
                let mut handler = lock(handler);
                (&mut *handler)(Err(err));
            }
            (Handler::Collection(handler), Event::Collection(snapshot)) => {
                let mut handler = lock(handler);
                (&mut *handler)(Ok(snapshot));
            }
            (Handler::Collection(handler), Event::Error(err)) => {
                let mut handler = lock(handler);
                (&mut *handler)(Err(err));
            }
            _ => tracing::warn!(listener = self.listener, "Snapshot kind does not match listener"),
        }
    }
}

#[derive(Default)]
struct State {
    documents: BTreeMap<CollectionPath, BTreeMap<String, Document>>,
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
    version: u64,
    offline: HashSet<ClientId>,
    /// Listeners of offline clients that missed at least one change.
    suspended: BTreeSet<u64>,
}

impl State {
    fn get(&self, doc: &DocumentRef) -> Option<&Document> {
        self.documents
            .get(doc.collection())
            .and_then(|docs| docs.get(doc.id()))
    }

    fn put(&mut self, doc: &DocumentRef, next: Option<Document>) {
        match next {
            Some(document) => {
                self.documents
                    .entry(doc.collection().clone())
                    .or_default()
                    .insert(doc.id().to_string(), document);
            }
            None => {
                if let Some(docs) = self.documents.get_mut(doc.collection()) {
                    docs.remove(doc.id());
                    if docs.is_empty() {
                        self.documents.remove(doc.collection());
                    }
                }
            }
        }
    }

    fn collection(&self, collection: &CollectionPath) -> Vec<Document> {
        self.documents
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn event_for(&self, target: &Target, origin: Option<ClientId>) -> Event {
        let metadata = SnapshotMetadata { origin };
        match target {
            Target::Document(doc) => Event::Document(DocumentSnapshot {
                reference: doc.clone(),
                document: self.get(doc).cloned(),
                metadata,
            }),
            Target::Collection(collection) => Event::Collection(QuerySnapshot {
                collection: collection.clone(),
                documents: self.collection(collection),
                metadata,
            }),
        }
    }

    /// Deliveries owed to listeners after `changed` documents were written.
    fn deliveries_for(&mut self, changed: &[DocumentRef], origin: ClientId) -> Vec<Delivery> {
        let mut affected = Vec::new();
        for (id, listener) in &self.listeners {
            let hit = match &listener.target {
                Target::Document(doc) => changed.contains(doc),
                Target::Collection(collection) => {
                    changed.iter().any(|doc| doc.collection() == collection)
                }
            };
            if hit {
                affected.push(*id);
            }
        }

        let mut deliveries = Vec::new();
        for id in affected {
            let listener = &self.listeners[&id];
            if self.offline.contains(&listener.client) {
                self.suspended.insert(id);
                continue;
            }
            deliveries.push(Delivery {
                listener: id,
                handler: listener.handler.clone(),
                event: self.event_for(&listener.target, Some(origin)),
            });
        }
        deliveries
    }
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<Delivery>,
    draining: bool,
}

struct Inner {
    settings: StoreSettings,
    state: Mutex<State>,
    outbox: Mutex<Outbox>,
}

/// The shared database every [`MemoryStore`] client connects to.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Backend with immediate delivery.
    pub fn new() -> Self {
        Self::with_settings(StoreSettings::default())
    }

    pub fn with_settings(settings: StoreSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                state: Mutex::new(State::default()),
                outbox: Mutex::new(Outbox::default()),
            }),
        }
    }

    pub fn settings(&self) -> StoreSettings {
        self.inner.settings
    }

    /// Connect a new client bound to `auth`.
    pub fn connect(&self, auth: Auth) -> MemoryStore {
        MemoryStore::connect(self.clone(), auth)
    }

    /// Every stored document, ordered by path.
    pub fn documents(&self) -> Vec<Document> {
        let state = lock(&self.inner.state);
        state
            .documents
            .values()
            .flat_map(|docs| docs.values().cloned())
            .collect()
    }

    /// Replace the stored documents wholesale without notifying listeners.
    /// Meant for loading persisted data before clients connect.
    pub fn restore(&self, documents: impl IntoIterator<Item = Document>) {
        let mut state = lock(&self.inner.state);
        state.documents.clear();
        let mut version = 0;
        for document in documents {
            version = version.max(document.version);
            let reference = document.reference.clone();
            state.put(&reference, Some(document));
        }
        state.version = version;
    }

    /// Number of registered listeners across all clients.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.state).listeners.len()
    }

    /// Number of snapshots waiting for delivery.
    pub fn pending_deliveries(&self) -> usize {
        lock(&self.inner.outbox).queue.len()
    }

    /// Deliver every queued snapshot, including the ones produced by
    /// handlers while flushing.
    pub fn flush(&self) {
        {
            let mut outbox = lock(&self.inner.outbox);
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let delivery = {
                let mut outbox = lock(&self.inner.outbox);
                match outbox.queue.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };

            let registered = lock(&self.inner.state)
                .listeners
                .contains_key(&delivery.listener);
            // Errors are final and go out even though the listener is gone.
            if registered || matches!(delivery.event, Event::Error(_)) {
                tracing::debug!(listener = delivery.listener, "Delivering snapshot");
                delivery.dispatch();
            }
        }
    }

    fn deliver(&self) {
        if self.inner.settings.delivery == DeliveryMode::Immediate {
            self.flush();
        }
    }

    fn enqueue(&self, deliveries: Vec<Delivery>) {
        if deliveries.is_empty() {
            return;
        }
        lock(&self.inner.outbox).queue.extend(deliveries);
    }

    fn read_document(&self, doc: &DocumentRef) -> Option<Document> {
        lock(&self.inner.state).get(doc).cloned()
    }

    fn read_collection(&self, collection: &CollectionPath) -> Vec<Document> {
        lock(&self.inner.state).collection(collection)
    }

    /// Apply writes atomically on behalf of `origin`.
    fn apply(&self, origin: ClientId, ops: Vec<WriteOp>) -> StoreResult<()> {
        {
            let mut state = lock(&self.inner.state);
            let version = state.version + 1;
            let now = Utc::now();

            // Stage every write first so a failing op leaves the store untouched.
            let mut staged: BTreeMap<DocumentRef, Option<Fields>> = BTreeMap::new();
            for op in &ops {
                let doc = op.doc();
                let current = match staged.get(doc) {
                    Some(data) => data.clone(),
                    None => state.get(doc).map(|d| d.data.clone()),
                };

                let next = match op {
                    WriteOp::Set { writes, mode, .. } => {
                        let mut data = match (mode, current) {
                            (WriteMode::Merge, Some(data)) => data,
                            _ => Fields::new(),
                        };
                        writes.merge_into(&mut data);
                        Some(data)
                    }
                    WriteOp::Create { data, .. } => {
                        if current.is_some() {
                            return Err(StoreError::AlreadyExists(doc.path()));
                        }
                        Some(data.clone())
                    }
                    WriteOp::Update { writes, .. } => {
                        let mut data = current.ok_or_else(|| StoreError::NotFound(doc.path()))?;
                        writes.merge_into(&mut data);
                        Some(data)
                    }
                    WriteOp::Delete { .. } => {
                        if current.is_none() && self.inner.settings.enforce_existence {
                            return Err(StoreError::NotFound(doc.path()));
                        }
                        None
                    }
                };
                staged.insert(doc.clone(), next);
            }

            let mut changed = Vec::new();
            for (doc, next) in staged {
                let unchanged = match (state.get(&doc), &next) {
                    (None, None) => true,
                    (Some(previous), Some(data)) => previous.data == *data,
                    _ => false,
                };
                if unchanged {
                    continue;
                }
                let document = next.map(|data| Document {
                    reference: doc.clone(),
                    data,
                    version,
                    update_time: now,
                });
                state.put(&doc, document);
                changed.push(doc);
            }

            if changed.is_empty() {
                return Ok(());
            }
            state.version = version;
            tracing::debug!(version, documents = changed.len(), "Committed writes");

            let deliveries = state.deliveries_for(&changed, origin);
            self.enqueue(deliveries);
        }
        self.deliver();
        Ok(())
    }

    fn add_listener(&self, client: ClientId, target: Target, handler: Handler) -> u64 {
        let id = {
            let mut state = lock(&self.inner.state);
            let id = state.next_listener;
            state.next_listener += 1;

            if state.offline.contains(&client) {
                state.suspended.insert(id);
            } else {
                let initial = Delivery {
                    listener: id,
                    handler: handler.clone(),
                    event: state.event_for(&target, None),
                };
                self.enqueue(vec![initial]);
            }

            state.listeners.insert(
                id,
                Listener {
                    client,
                    target,
                    handler,
                },
            );
            id
        };
        self.deliver();
        id
    }

    fn remove_listener(&self, id: u64) {
        // Dropped unlocked: the handler may own the last handle to a client.
        let removed = {
            let mut state = lock(&self.inner.state);
            state.suspended.remove(&id);
            state.listeners.remove(&id)
        };
        drop(removed);
    }

    fn set_client_online(&self, client: ClientId, online: bool) {
        {
            let mut state = lock(&self.inner.state);
            if !online {
                state.offline.insert(client);
                return;
            }
            state.offline.remove(&client);

            // Catch suspended listeners up with the current state.
            let resumed: Vec<u64> = state
                .suspended
                .iter()
                .copied()
                .filter(|id| {
                    state
                        .listeners
                        .get(id)
                        .is_some_and(|listener| listener.client == client)
                })
                .collect();
            let mut deliveries = Vec::new();
            for id in resumed {
                state.suspended.remove(&id);
                let listener = &state.listeners[&id];
                deliveries.push(Delivery {
                    listener: id,
                    handler: listener.handler.clone(),
                    event: state.event_for(&listener.target, None),
                });
            }
            self.enqueue(deliveries);
        }
        self.deliver();
    }

    /// Terminate every listener of `client` with `error`.
    fn revoke_client(&self, client: ClientId, error: StoreError) {
        {
            let mut state = lock(&self.inner.state);
            let revoked: Vec<u64> = state
                .listeners
                .iter()
                .filter(|(_, listener)| listener.client == client)
                .map(|(id, _)| *id)
                .collect();

            let mut deliveries = Vec::new();
            for id in revoked {
                state.suspended.remove(&id);
                if let Some(listener) = state.listeners.remove(&id) {
                    deliveries.push(Delivery {
                        listener: id,
                        handler: listener.handler,
                        event: Event::Error(error.clone()),
                    });
                }
            }
            if !deliveries.is_empty() {
                tracing::info!(%client, listeners = deliveries.len(), "Revoked listeners");
            }
            self.enqueue(deliveries);
        }
        self.deliver();
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// One client connection to a [`MemoryBackend`].
pub struct MemoryStore {
    backend: MemoryBackend,
    auth: Auth,
    client: ClientId,
    online: AtomicBool,
    /// Writes issued while offline, replayed in order on reconnect.
    pending: Mutex<Vec<WriteBatch>>,
    _auth_watch: Mutex<Subscription>,
}

impl MemoryStore {
    /// Connect to `backend` as the identity held by `auth`.
    ///
    /// When that identity signs out or changes, every listener opened by
    /// this client receives `Err(Unauthenticated)` and is removed.
    pub fn connect(backend: MemoryBackend, auth: Auth) -> Self {
        let client = ClientId::new();
        let watcher = backend.clone();
        let mut signed_in: Option<String> = None;
        let auth_watch = auth.on_auth_state_changed(move |user| {
            let uid = user.as_ref().map(|u| u.uid.clone());
            if signed_in.is_some() && signed_in != uid {
                watcher.revoke_client(client, StoreError::Unauthenticated);
            }
            signed_in = uid;
        });

        Self {
            backend,
            auth,
            client,
            online: AtomicBool::new(true),
            pending: Mutex::new(Vec::new()),
            _auth_watch: Mutex::new(auth_watch),
        }
    }

    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Number of writes waiting for reconnect.
    pub fn pending_writes(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Simulate losing or regaining connectivity. Going online replays
    /// queued writes and refreshes listeners that missed changes.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return;
        }
        self.backend.set_client_online(self.client, online);
        if !online {
            tracing::info!(client = %self.client, "Connection lost");
            return;
        }

        let pending = std::mem::take(&mut *lock(&self.pending));
        tracing::info!(client = %self.client, writes = pending.len(), "Reconnected");
        for batch in pending {
            if let Err(e) = self.backend.apply(self.client, batch.into_ops()) {
                tracing::warn!("Queued write failed on replay: {}", e);
            }
        }
    }

    fn authorize(&self, owner: Option<&str>, path: impl FnOnce() -> String) -> StoreResult<()> {
        let uid = self.auth.uid().ok_or(StoreError::Unauthenticated)?;
        match owner {
            Some(owner) if owner == uid => Ok(()),
            _ => Err(StoreError::PermissionDenied(path())),
        }
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::TransientNetwork("client is offline".to_string()))
        }
    }

    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        for op in batch.ops() {
            let doc = op.doc();
            self.authorize(doc.owner(), || doc.path())?;
        }
        if !self.is_online() {
            lock(&self.pending).push(batch);
            return Err(StoreError::TransientNetwork(
                "client is offline, write queued".to_string(),
            ));
        }
        self.backend.apply(self.client, batch.into_ops())
    }
}

impl DocumentStore for MemoryStore {
    fn client_id(&self) -> ClientId {
        self.client
    }

    fn get_document(&self, doc: &DocumentRef) -> StoreResult<Option<Document>> {
        self.authorize(doc.owner(), || doc.path())?;
        self.ensure_online()?;
        Ok(self.backend.read_document(doc))
    }

    fn get_collection(&self, collection: &CollectionPath) -> StoreResult<Vec<Document>> {
        self.authorize(collection.owner(), || collection.to_string())?;
        self.ensure_online()?;
        Ok(self.backend.read_collection(collection))
    }

    fn set_document(
        &self,
        doc: &DocumentRef,
        writes: FieldWrites,
        mode: WriteMode,
    ) -> StoreResult<()> {
        self.write(
            WriteOp::Set {
                doc: doc.clone(),
                writes,
                mode,
            }
            .into(),
        )
    }

    fn create_document(&self, doc: &DocumentRef, data: Fields) -> StoreResult<()> {
        self.write(
            WriteOp::Create {
                doc: doc.clone(),
                data,
            }
            .into(),
        )
    }

    fn update_document(&self, doc: &DocumentRef, writes: FieldWrites) -> StoreResult<()> {
        self.write(
            WriteOp::Update {
                doc: doc.clone(),
                writes,
            }
            .into(),
        )
    }

    fn delete_document(&self, doc: &DocumentRef) -> StoreResult<()> {
        self.write(WriteOp::Delete { doc: doc.clone() }.into())
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.write(batch)
    }

    fn watch_document(
        &self,
        doc: &DocumentRef,
        handler: DocumentHandler,
    ) -> StoreResult<Subscription> {
        self.authorize(doc.owner(), || doc.path())?;
        let id = self.backend.add_listener(
            self.client,
            Target::Document(doc.clone()),
            Handler::Document(Arc::new(Mutex::new(handler))),
        );
        let backend = self.backend.clone();
        Ok(Subscription::new(move || backend.remove_listener(id)))
    }

    fn watch_collection(
        &self,
        collection: &CollectionPath,
        handler: CollectionHandler,
    ) -> StoreResult<Subscription> {
        self.authorize(collection.owner(), || collection.to_string())?;
        let id = self.backend.add_listener(
            self.client,
            Target::Collection(collection.clone()),
            Handler::Collection(Arc::new(Mutex::new(handler))),
        );
        let backend = self.backend.clone();
        Ok(Subscription::new(move || backend.remove_listener(id)))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("client", &self.client)
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}
