use std::sync::{Arc, Mutex};

use crate::auth::Auth;
use crate::subscription::{lock, Subscription};

use super::board::BoardSync;

/// Top-level screen the UI should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    SignIn,
    Board,
}

/// Drives a [`BoardSync`] from auth state changes: a sign-in starts a
/// session for that identity, a sign-out stops it and clears the view.
pub struct SessionController {
    sync: Arc<BoardSync>,
    route: Arc<Mutex<Route>>,
    _auth_watch: Subscription,
}

impl SessionController {
    pub fn attach(auth: &Auth, sync: Arc<BoardSync>) -> Self {
        let route = Arc::new(Mutex::new(Route::SignIn));

        let handler_sync = Arc::clone(&sync);
        let handler_route = Arc::clone(&route);
        let auth_watch = auth.on_auth_state_changed(move |user| {
            let next = match user {
                Some(user) => match handler_sync.start(user.clone()) {
                    Ok(()) => Route::Board,
                    Err(e) => {
                        tracing::warn!(uid = %user.uid, "Board sync failed to start: {}", e);
                        handler_sync.stop();
                        Route::SignIn
                    }
                },
                None => {
                    handler_sync.stop();
                    handler_sync.view().reset();
                    Route::SignIn
                }
            };
            *lock(&handler_route) = next;
        });

        Self {
            sync,
            route,
            _auth_watch: auth_watch,
        }
    }

    pub fn route(&self) -> Route {
        *lock(&self.route)
    }

    pub fn sync(&self) -> &Arc<BoardSync> {
        &self.sync
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("route", &self.route())
            .field("sync", &self.sync)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use crate::store::MemoryBackend;
    use crate::sync::{SyncSettings, WatchState, Watched};
    use crate::view::ViewState;

    fn controller() -> (Auth, SessionController) {
        let auth = Auth::new();
        let store = Arc::new(MemoryBackend::new().connect(auth.clone()));
        let sync = Arc::new(BoardSync::new(store, ViewState::new(), SyncSettings::default()));
        let controller = SessionController::attach(&auth, sync);
        (auth, controller)
    }

    #[test]
    fn test_signed_out_routes_to_sign_in() {
        let (_auth, controller) = controller();
        assert_eq!(controller.route(), Route::SignIn);
        assert!(!controller.sync().is_started());
    }

    #[test]
    fn test_sign_in_starts_session() {
        let (auth, controller) = controller();
        auth.sign_in(AuthUser::new("u1").with_display_name("Ada"));

        assert_eq!(controller.route(), Route::Board);
        assert_eq!(controller.sync().watch_state(Watched::Tasks), WatchState::Live);
        assert_eq!(controller.sync().view().snapshot().user.first_name, "Ada");
    }

    #[test]
    fn test_sign_out_stops_session_and_clears_view() {
        let (auth, controller) = controller();
        auth.sign_in(AuthUser::new("u1").with_display_name("Ada"));
        controller.sync().add_column("Todo").unwrap();

        auth.sign_out();

        assert_eq!(controller.route(), Route::SignIn);
        assert!(!controller.sync().is_started());
        assert_eq!(controller.sync().watch_state(Watched::Board), WatchState::Unsubscribed);
        assert!(controller.sync().view().snapshot().column_order.is_empty());
    }

    #[test]
    fn test_switching_users_restarts_session() {
        let (auth, controller) = controller();
        auth.sign_in(AuthUser::new("u1"));
        controller.sync().add_column("Mine").unwrap();

        auth.sign_in(AuthUser::new("u2"));

        assert_eq!(controller.route(), Route::Board);
        assert_eq!(controller.sync().user().map(|u| u.uid), Some("u2".to_string()));
        assert!(controller.sync().view().snapshot().columns.is_empty());
    }
}
