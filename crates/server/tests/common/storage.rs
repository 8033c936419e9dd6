//! Storage test doubles.

use async_trait::async_trait;
use bytes::Bytes;
use picstore_storage::{
    ByteStream, FilesystemBackend, ObjectMeta, ObjectStore, StorageError, StorageResult,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Filesystem store whose writes can be made to fail.
#[allow(dead_code)]
pub struct FailingStorage {
    inner: FilesystemBackend,
    fail_writes: AtomicBool,
    pub write_attempts: AtomicUsize,
}

#[allow(dead_code)]
impl FailingStorage {
    pub async fn new(root: impl AsRef<Path>) -> Self {
        Self {
            inner: FilesystemBackend::new(root)
                .await
                .expect("Failed to create storage backend"),
            fail_writes: AtomicBool::new(true),
            write_attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> StorageResult<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FailingStorage {
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.check_write()?;
        self.inner.put_if_not_exists(key, data).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
