use std::sync::Arc;

use kanban_core::{
    Auth, AuthUser, BoardSync, DocumentStore, FileStorage, MemoryBackend, Route, SessionController,
    ViewState,
};

use crate::config::Config;

/// A signed-in board session backed by the data directory.
///
/// Documents are loaded into an in-memory store on open and written back by
/// [`LocalSession::close`].
pub struct LocalSession {
    storage: FileStorage,
    backend: MemoryBackend,
    auth: Auth,
    controller: SessionController,
}

impl LocalSession {
    pub fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = FileStorage::new(config.data_dir.value.clone());
        let backend = MemoryBackend::new();
        let loaded = storage.load_into(&backend)?;
        tracing::debug!(
            documents = loaded,
            data_dir = %storage.data_dir().display(),
            "Opened board data"
        );

        let auth = Auth::new();
        let store: Arc<dyn DocumentStore> = Arc::new(backend.connect(auth.clone()));
        let sync = Arc::new(BoardSync::new(
            store,
            ViewState::new(),
            config.sync_settings(),
        ));
        let controller = SessionController::attach(&auth, sync);

        auth.sign_in(
            AuthUser::new(config.user.uid.value.clone())
                .with_display_name(config.user.display_name.value.clone()),
        );
        if controller.route() != Route::Board {
            return Err(format!(
                "Could not open the board for '{}'",
                config.user.uid.value
            )
            .into());
        }

        Ok(Self {
            storage,
            backend,
            auth,
            controller,
        })
    }

    pub fn sync(&self) -> &BoardSync {
        self.controller.sync()
    }

    /// Persist every document and sign out.
    pub fn close(self) -> Result<usize, Box<dyn std::error::Error>> {
        let saved = self.storage.save_from(&self.backend)?;
        tracing::debug!(documents = saved, "Saved board data");
        self.auth.sign_out();
        Ok(saved)
    }
}
