//! Persistent image index for picstore.
//!
//! Maps `(scope, fingerprint)` to the stored file name. Rows start as
//! `pending` reservations and become `committed` once the file is on disk.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{ImageRow, ImageState};
pub use repos::ImageRepo;
pub use store::{MetadataStore, SqliteStore};

use picstore_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
