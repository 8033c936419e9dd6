//! Image index test doubles.

use async_trait::async_trait;
use picstore_metadata::{
    ImageRepo, ImageRow, MetadataError, MetadataResult, MetadataStore, SqliteStore,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::OffsetDateTime;
use uuid::Uuid;

/// SQLite index whose commits can fail and whose reservations can report
/// conflicts with rows that do not exist.
#[allow(dead_code)]
pub struct FailingMetadata {
    inner: SqliteStore,
    fail_commits: AtomicBool,
    phantom_conflicts: AtomicUsize,
    pub reserve_attempts: AtomicUsize,
}

#[allow(dead_code)]
impl FailingMetadata {
    pub async fn new(path: impl AsRef<Path>) -> Self {
        Self {
            inner: SqliteStore::new(path)
                .await
                .expect("Failed to create metadata store"),
            fail_commits: AtomicBool::new(false),
            phantom_conflicts: AtomicUsize::new(0),
            reserve_attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing_commits(self) -> Self {
        self.fail_commits.store(true, Ordering::SeqCst);
        self
    }

    /// The next `n` reservations fail with `DuplicateFingerprint` without
    /// inserting anything.
    pub fn with_phantom_conflicts(self, n: usize) -> Self {
        self.phantom_conflicts.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ImageRepo for FailingMetadata {
    async fn get_image(&self, scope: &str, fingerprint: &str) -> MetadataResult<Option<ImageRow>> {
        self.inner.get_image(scope, fingerprint).await
    }

    async fn reserve_image(&self, image: &ImageRow) -> MetadataResult<()> {
        self.reserve_attempts.fetch_add(1, Ordering::SeqCst);
        let conflict = self
            .phantom_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            return Err(MetadataError::DuplicateFingerprint(format!(
                "{}/{}",
                image.scope, image.fingerprint
            )));
        }
        self.inner.reserve_image(image).await
    }

    async fn commit_image(
        &self,
        image_id: Uuid,
        committed_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(MetadataError::Io(std::io::Error::other("database is locked")));
        }
        self.inner.commit_image(image_id, committed_at).await
    }

    async fn release_reservation(&self, image_id: Uuid) -> MetadataResult<bool> {
        self.inner.release_reservation(image_id).await
    }

    async fn count_images(&self, scope: Option<&str>) -> MetadataResult<u64> {
        self.inner.count_images(scope).await
    }
}

#[async_trait]
impl MetadataStore for FailingMetadata {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
