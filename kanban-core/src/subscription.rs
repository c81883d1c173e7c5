//! Cancellable subscriptions and a small listener registry.
//!
//! Every `subscribe`-style call in this crate returns a [`Subscription`].
//! Cancelling it consumes the handle, so a listener can only be removed once,
//! and dropping it cancels as well.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle returned by every subscribe call.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap the cancellation action of a listener.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription that has nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Stop delivery.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Handler<E> = Arc<Mutex<dyn FnMut(&E) + Send>>;

struct Registry<E> {
    next_id: u64,
    handlers: BTreeMap<u64, Handler<E>>,
    /// Events waiting for delivery, optionally addressed to one handler.
    pending: VecDeque<(Option<u64>, E)>,
    emitting: bool,
}

impl<E> Registry<E> {
    fn insert(&mut self, handler: Handler<E>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.insert(id, handler);
        id
    }
}

/// Registry of event handlers.
///
/// Handlers run outside the registry lock, so a handler may add or remove
/// listeners (including itself) while being called. Events emitted from
/// inside a handler are queued and delivered after the current event, in
/// order, so handlers are never re-entered.
pub struct Listeners<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: Send + 'static> Listeners<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: BTreeMap::new(),
                pending: VecDeque::new(),
                emitting: false,
            })),
        }
    }

    /// Register a handler. It stays registered until the returned
    /// subscription is cancelled or dropped.
    pub fn add(&self, handler: impl FnMut(&E) + Send + 'static) -> Subscription {
        let id = lock(&self.registry).insert(Arc::new(Mutex::new(handler)));
        self.subscription(id)
    }

    /// Register a handler and deliver `initial()` to it ahead of every event
    /// emitted after registration.
    ///
    /// `initial` runs while the registry is locked and must not use this
    /// registry.
    pub fn add_with(
        &self,
        handler: impl FnMut(&E) + Send + 'static,
        initial: impl FnOnce() -> E,
    ) -> Subscription {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.insert(Arc::new(Mutex::new(handler)));
            let event = initial();
            registry.pending.push_back((Some(id), event));
            id
        };
        let subscription = self.subscription(id);
        self.drain();
        subscription
    }

    fn subscription(&self, id: u64) -> Subscription {
        let registry = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                // The handler may own the last reference to something that
                // locks this registry when dropped.
                let removed = lock(&registry).handlers.remove(&id);
                drop(removed);
            }
        })
    }

    /// Call every registered handler with the event.
    pub fn emit(&self, event: E) {
        lock(&self.registry).pending.push_back((None, event));
        self.drain();
    }

    fn drain(&self) {
        {
            let mut registry = lock(&self.registry);
            if registry.emitting {
                return;
            }
            registry.emitting = true;
        }

        loop {
            let (event, handlers) = {
                let mut registry = lock(&self.registry);
                match registry.pending.pop_front() {
                    Some((target, event)) => {
                        let handlers: Vec<(u64, Handler<E>)> = registry
                            .handlers
                            .iter()
                            .filter(|(id, _)| target.map_or(true, |target| target == **id))
                            .map(|(id, handler)| (*id, Arc::clone(handler)))
                            .collect();
                        (event, handlers)
                    }
                    None => {
                        registry.emitting = false;
                        return;
                    }
                }
            };

            for (id, handler) in handlers {
                // Skip handlers removed by an earlier handler in this round.
                if !lock(&self.registry).handlers.contains_key(&id) {
                    continue;
                }
                let mut handler = lock(&handler);
                (&mut *handler)(&event);
            }
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        lock(&self.registry).handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Send + 'static> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Listeners<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}
