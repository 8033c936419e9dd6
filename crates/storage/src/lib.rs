//! Object storage abstraction and backends for picstore.
//!
//! This crate provides:
//! - The `ObjectStore` trait used by the upload workflow and image serving
//! - A local filesystem backend with atomic writes and path traversal protection

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore};

use picstore_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
