//! Image index repository.

use crate::error::MetadataResult;
use crate::models::ImageRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for image index operations.
#[async_trait]
pub trait ImageRepo: Send + Sync {
    /// Get the row for `(scope, fingerprint)` in any state.
    async fn get_image(&self, scope: &str, fingerprint: &str) -> MetadataResult<Option<ImageRow>>;

    /// Insert a pending reservation.
    ///
    /// Fails with `DuplicateFingerprint` if the scope already indexes this
    /// content, or `DuplicateName` if the stored name is taken in the scope.
    async fn reserve_image(&self, image: &ImageRow) -> MetadataResult<()>;

    /// Transition a pending reservation to committed.
    async fn commit_image(&self, image_id: Uuid, committed_at: OffsetDateTime)
    -> MetadataResult<()>;

    /// Delete a pending reservation. Committed rows are never removed.
    ///
    /// Returns `true` if a row was deleted.
    async fn release_reservation(&self, image_id: Uuid) -> MetadataResult<bool>;

    /// Count rows in `scope` (all scopes when `None`).
    async fn count_images(&self, scope: Option<&str>) -> MetadataResult<u64>;
}
