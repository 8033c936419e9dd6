//! Application state shared across handlers.

use crate::upload::UploadService;
use picstore_core::config::AppConfig;
use picstore_metadata::MetadataStore;
use picstore_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend holding the image files.
    pub storage: Arc<dyn ObjectStore>,
    /// Persistent image index.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload workflow bound to the stores above.
    pub uploads: Arc<UploadService>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Fails if the configured default scope is invalid.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> picstore_core::Result<Self> {
        let uploads = UploadService::new(
            storage.clone(),
            metadata.clone(),
            config.server.base_url(),
            config.server.default_scope()?,
            config.server.reservation_ttl(),
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            metadata,
            uploads: Arc::new(uploads),
        })
    }
}
