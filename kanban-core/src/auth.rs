//! Identity provider.
//!
//! Holds the signed-in identity and publishes auth state changes. The store
//! client scopes every operation to the current uid, and the session
//! controller starts and stops board sync from these events.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::subscription::{lock, Listeners, Subscription};

/// A signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub display_name: Option<String>,
}

impl AuthUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Identity plus the number of changes made to it so far.
#[derive(Debug, Default)]
struct AuthState {
    user: Option<AuthUser>,
    generation: u64,
}

/// An auth state change, stamped with the generation it produced.
type AuthEvent = (u64, Option<AuthUser>);

/// Shared handle to the auth state. Clones observe the same identity.
#[derive(Clone)]
pub struct Auth {
    current: Arc<Mutex<AuthState>>,
    listeners: Listeners<AuthEvent>,
}

impl Auth {
    /// Signed-out auth state.
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(AuthState::default())),
            listeners: Listeners::new(),
        }
    }

    /// Currently signed-in user, if any.
    pub fn current_user(&self) -> Option<AuthUser> {
        lock(&self.current).user.clone()
    }

    /// Uid of the signed-in user, if any.
    pub fn uid(&self) -> Option<String> {
        lock(&self.current).user.as_ref().map(|user| user.uid.clone())
    }

    /// Sign a user in, replacing any previous identity.
    pub fn sign_in(&self, user: AuthUser) {
        let generation = {
            let mut current = lock(&self.current);
            if current.user.as_ref() == Some(&user) {
                return;
            }
            current.user = Some(user.clone());
            current.generation += 1;
            current.generation
        };
        tracing::info!("Signed in as {}", user.uid);
        self.listeners.emit((generation, Some(user)));
    }

    /// Sign the current user out.
    pub fn sign_out(&self) {
        let (previous, generation) = {
            let mut current = lock(&self.current);
            let previous = current.user.take();
            if previous.is_some() {
                current.generation += 1;
            }
            (previous, current.generation)
        };
        if let Some(user) = previous {
            tracing::info!("Signed out {}", user.uid);
            self.listeners.emit((generation, None));
        }
    }

    /// Observe auth state. The handler is called immediately with the
    /// current state and again on every later change. Changes racing with
    /// registration are delivered once, in order.
    pub fn on_auth_state_changed(
        &self,
        handler: impl FnMut(&Option<AuthUser>) + Send + 'static,
    ) -> Subscription {
        let mut handler = handler;
        let mut seen: Option<u64> = None;
        let current = Arc::clone(&self.current);
        self.listeners.add_with(
            move |(generation, user): &AuthEvent| {
                if seen.is_some_and(|seen| *generation <= seen) {
                    return;
                }
                seen = Some(*generation);
                handler(user);
            },
            move || {
                let state = lock(&current);
                (state.generation, state.user.clone())
            },
        )
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("current", &self.current_user())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(auth: &Auth) -> (Arc<Mutex<Vec<Option<String>>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let subscription = auth.on_auth_state_changed(move |user| {
            log.lock()
                .unwrap()
                .push(user.as_ref().map(|u| u.uid.clone()));
        });
        (seen, subscription)
    }

    #[test]
    fn test_starts_signed_out() {
        let auth = Auth::new();
        assert_eq!(auth.current_user(), None);
        assert_eq!(auth.uid(), None);
    }

    #[test]
    fn test_handler_fires_immediately_and_on_change() {
        let auth = Auth::new();
        let (seen, _subscription) = recorder(&auth);

        auth.sign_in(AuthUser::new("u1").with_display_name("Ada"));
        auth.sign_out();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("u1".to_string()), None]
        );
    }

    #[test]
    fn test_repeated_sign_in_does_not_re_emit() {
        let auth = Auth::new();
        let (seen, _subscription) = recorder(&auth);

        auth.sign_in(AuthUser::new("u1"));
        auth.sign_in(AuthUser::new("u1"));
        auth.sign_out();
        auth.sign_out();

        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_clones_share_state() {
        let auth = Auth::new();
        let other = auth.clone();
        auth.sign_in(AuthUser::new("u2"));
        assert_eq!(other.uid(), Some("u2".to_string()));
    }

    #[test]
    fn test_handler_registered_during_a_change_sees_each_state_once() {
        let auth = Auth::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let late = Arc::new(Mutex::new(None));

        let inner = auth.clone();
        let log = Arc::clone(&seen);
        let slot = Arc::clone(&late);
        let _first = auth.on_auth_state_changed(move |user| {
            if user.as_ref().map(|u| u.uid.as_str()) != Some("u1") {
                return;
            }
            // Switch identity, then subscribe while both changes are queued.
            inner.sign_in(AuthUser::new("u2"));
            let log = Arc::clone(&log);
            let subscription = inner.on_auth_state_changed(move |user| {
                log.lock()
                    .unwrap()
                    .push(user.as_ref().map(|u| u.uid.clone()));
            });
            *slot.lock().unwrap() = Some(subscription);
        });

        auth.sign_in(AuthUser::new("u1"));

        assert_eq!(*seen.lock().unwrap(), vec![Some("u2".to_string())]);
        assert_eq!(auth.uid(), Some("u2".to_string()));
    }

    #[test]
    fn test_sign_in_from_another_thread_is_observed() {
        let auth = Auth::new();
        let (seen, _subscription) = recorder(&auth);

        let other = auth.clone();
        std::thread::spawn(move || other.sign_in(AuthUser::new("u3")))
            .join()
            .unwrap();

        assert_eq!(
            seen.lock().unwrap().last().cloned(),
            Some(Some("u3".to_string()))
        );
    }

    #[test]
    fn test_cancelled_handler_stops_receiving() {
        let auth = Auth::new();
        let (seen, subscription) = recorder(&auth);
        subscription.cancel();

        auth.sign_in(AuthUser::new("u1"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
