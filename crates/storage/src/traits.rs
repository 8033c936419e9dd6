//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Object store holding uploaded image files.
///
/// Keys are `/`-separated relative paths such as `anon/cat.png`. Backends
/// must reject keys that would escape their root.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Get an object's size without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put an object only if nothing exists at `key`.
    ///
    /// The object becomes visible fully written or not at all. Intermediate
    /// directories (scopes) are created on demand. Returns `false` without
    /// touching the existing object if the key is taken.
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool>;

    /// Get the name of this storage backend, used for logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend availability.
    ///
    /// Called at startup and by the health endpoint.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
}
