//! Application state shared across handlers.

use std::sync::Arc;

use crate::{config::AdminConfig, services::IdGenerator, store::RecordStoreClient};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    store: RecordStoreClient,
    ids: IdGenerator<RecordStoreClient>,
}

impl AppState {
    /// Build state around an already-constructed store client.
    #[must_use]
    pub fn new(config: AdminConfig, store: RecordStoreClient) -> Self {
        let ids = IdGenerator::new(store.clone(), config.current_year);
        Self {
            inner: Arc::new(AppStateInner { config, store, ids }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    /// Record store client holding the admin token.
    #[must_use]
    pub fn store(&self) -> &RecordStoreClient {
        &self.inner.store
    }

    #[must_use]
    pub fn ids(&self) -> &IdGenerator<RecordStoreClient> {
        &self.inner.ids
    }

    /// Year used for business ids and inquiry numbers.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.inner.ids.year()
    }
}
