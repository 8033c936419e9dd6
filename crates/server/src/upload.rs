//! Upload workflow: fingerprint, deduplicate, reserve, persist, commit.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::response::PartHeaders;
use bytes::Bytes;
use futures::StreamExt;
use picstore_core::{ContentHash, Scope, StoredImage, StoredName, object_key, public_url};
use picstore_metadata::{ImageRow, MetadataError, MetadataStore};
use picstore_storage::{ObjectStore, StorageError};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::instrument;
use uuid::Uuid;

/// Lookups restarted after losing a reservation race to an upload that
/// then abandoned it.
const LOOKUP_ATTEMPTS: usize = 3;

/// Random-suffixed names tried after the deterministic candidates.
const UNIQUE_NAME_ATTEMPTS: usize = 3;

/// A fully buffered upload as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Caller-supplied scope; `None` or empty selects the default scope.
    pub scope: Option<String>,
    /// Client file name, possibly with directory components.
    pub file_name: String,
    pub content_type: Option<String>,
    /// Multipart part headers, echoed back for observability.
    pub headers: PartHeaders,
    pub data: Bytes,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// The content was new in its scope and is now stored.
    Created {
        image: StoredImage,
        url: String,
        size: u64,
        headers: PartHeaders,
    },
    /// The scope already holds identical content.
    AlreadyExists { image: StoredImage, url: String },
}

impl UploadOutcome {
    pub fn image(&self) -> &StoredImage {
        match self {
            Self::Created { image, .. } | Self::AlreadyExists { image, .. } => image,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Created { url, .. } | Self::AlreadyExists { url, .. } => url,
        }
    }
}

/// Index state for `(scope, fingerprint)` before storing.
enum Existing {
    Found(StoredImage),
    /// A stale reservation was dropped; its stored name is tried first.
    Reclaimed(String),
    Missing,
}

enum Stored {
    Created(StoredImage),
    Raced,
}

/// Stored names to try in order, without repeats.
fn candidate_names(
    name: &StoredName,
    fingerprint: &ContentHash,
    reclaimed: Option<String>,
) -> Vec<String> {
    let mut names: Vec<String> = reclaimed.into_iter().collect();
    let deterministic = name.candidates(fingerprint).into_iter();
    let unique = (0..UNIQUE_NAME_ATTEMPTS)
        .map(|_| name.unique_candidate(fingerprint, &Uuid::new_v4().simple().to_string()));
    for candidate in deterministic.chain(unique) {
        let candidate = candidate.to_string();
        if !names.contains(&candidate) {
            names.push(candidate);
        }
    }
    names
}

/// Handles uploads against an object store and the image index.
pub struct UploadService {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    base_url: String,
    default_scope: Scope,
    reservation_ttl: Duration,
}

impl UploadService {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        base_url: impl Into<String>,
        default_scope: Scope,
        reservation_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            metadata,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_scope,
            reservation_ttl,
        }
    }

    /// Public URL of a stored image.
    pub fn url_for(&self, image: &StoredImage) -> String {
        public_url(&self.base_url, &image.scope, &image.stored_name)
    }

    /// Store `upload` unless its scope already holds the same content.
    #[instrument(
        skip(self, upload),
        fields(scope = ?upload.scope, file_name = %upload.file_name, size = upload.data.len())
    )]
    pub async fn handle(&self, upload: Upload) -> ApiResult<UploadOutcome> {
        let timer = metrics::UPLOAD_DURATION.start_timer();
        let result = self.process(upload).await;
        timer.observe_duration();

        match &result {
            Ok(UploadOutcome::Created { image, size, .. }) => {
                metrics::IMAGES_UPLOADED.inc();
                metrics::BYTES_UPLOADED.inc_by(*size);
                tracing::info!(
                    scope = %image.scope,
                    stored_name = %image.stored_name,
                    fingerprint = %image.fingerprint,
                    size,
                    "image stored"
                );
            }
            Ok(UploadOutcome::AlreadyExists { image, .. }) => {
                metrics::IMAGES_DEDUPLICATED.inc();
                tracing::info!(
                    scope = %image.scope,
                    stored_name = %image.stored_name,
                    "duplicate upload"
                );
            }
            Err(e) => metrics::record_upload_error(e.code()),
        }
        result
    }

    async fn process(&self, upload: Upload) -> ApiResult<UploadOutcome> {
        let scope = Scope::resolve(upload.scope.as_deref(), &self.default_scope)?;
        let fingerprint = ContentHash::compute(&upload.data);

        for _ in 0..LOOKUP_ATTEMPTS {
            let reclaimed = match self.find_existing(&scope, &fingerprint).await? {
                Existing::Found(image) => return Ok(self.already_exists(image)),
                Existing::Reclaimed(stored_name) => Some(stored_name),
                Existing::Missing => None,
            };

            let name = StoredName::from_original(&upload.file_name)?;
            match self
                .store_new(&scope, &fingerprint, &name, reclaimed, &upload)
                .await?
            {
                Stored::Created(image) => {
                    return Ok(UploadOutcome::Created {
                        url: self.url_for(&image),
                        image,
                        size: upload.data.len() as u64,
                        headers: upload.headers,
                    });
                }
                // A concurrent upload of the same content reserved first.
                Stored::Raced => {
                    if let Some(image) = self.lookup(&scope, &fingerprint).await? {
                        return Ok(self.already_exists(image));
                    }
                    tracing::debug!(
                        %scope,
                        %fingerprint,
                        "competing reservation vanished, retrying"
                    );
                }
            }
        }

        Err(ApiError::Internal(format!(
            "gave up storing {fingerprint} in scope {scope} after {LOOKUP_ATTEMPTS} attempts"
        )))
    }

    /// Reserve a stored name, write the file and commit the reservation.
    async fn store_new(
        &self,
        scope: &Scope,
        fingerprint: &ContentHash,
        name: &StoredName,
        reclaimed: Option<String>,
        upload: &Upload,
    ) -> ApiResult<Stored> {
        let size_bytes = i64::try_from(upload.data.len()).map_err(|_| {
            ApiError::PayloadTooLarge(format!("{} bytes cannot be indexed", upload.data.len()))
        })?;

        for stored_name in candidate_names(name, fingerprint, reclaimed) {
            let row = ImageRow::pending(
                scope,
                fingerprint,
                &stored_name,
                size_bytes,
                upload.content_type.clone(),
                OffsetDateTime::now_utc(),
            );

            match self.metadata.reserve_image(&row).await {
                Ok(()) => {}
                Err(MetadataError::DuplicateFingerprint(_)) => return Ok(Stored::Raced),
                Err(MetadataError::DuplicateName(_)) => {
                    metrics::NAME_COLLISIONS.inc();
                    tracing::debug!(%stored_name, "stored name taken in index");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let key = object_key(scope, &stored_name);
            match self.write_or_adopt(&key, fingerprint, &upload.data).await {
                Ok(true) => {}
                Ok(false) => {
                    self.release(&row).await;
                    metrics::NAME_COLLISIONS.inc();
                    tracing::debug!(%key, "unindexed file with other content on disk");
                    continue;
                }
                Err(e) => {
                    self.release(&row).await;
                    return Err(e.into());
                }
            }

            // A failed commit leaves the file and the pending row in place;
            // the row is reclaimed once older than the reservation TTL.
            self.metadata
                .commit_image(row.image_id, OffsetDateTime::now_utc())
                .await?;

            return Ok(Stored::Created(StoredImage {
                fingerprint: *fingerprint,
                scope: scope.clone(),
                stored_name,
            }));
        }

        Err(ApiError::Internal(format!(
            "every stored name candidate for {name} is taken in scope {scope}"
        )))
    }

    /// Write `data` at `key`, or adopt a file already there holding the
    /// same content. Returns `false` if the key holds other content.
    async fn write_or_adopt(
        &self,
        key: &str,
        fingerprint: &ContentHash,
        data: &Bytes,
    ) -> Result<bool, StorageError> {
        if self.storage.put_if_not_exists(key, data.clone()).await? {
            return Ok(true);
        }

        let meta = match self.storage.head(key).await {
            Ok(meta) => meta,
            Err(StorageError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if meta.size != data.len() as u64 {
            return Ok(false);
        }

        let mut stream = match self.storage.get_stream(key).await {
            Ok(stream) => stream,
            Err(StorageError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let mut hasher = ContentHash::hasher();
        while let Some(chunk) = stream.next().await {
            hasher.update(&chunk?);
        }

        let adopted = hasher.finalize() == *fingerprint;
        if adopted {
            tracing::info!(%key, "adopting unindexed file with identical content");
        }
        Ok(adopted)
    }

    /// Existing image for `(scope, fingerprint)`, reclaiming a stale reservation.
    async fn find_existing(&self, scope: &Scope, fingerprint: &ContentHash) -> ApiResult<Existing> {
        let Some(row) = self
            .metadata
            .get_image(scope.as_str(), &fingerprint.to_hex())
            .await?
        else {
            return Ok(Existing::Missing);
        };

        if row.is_stale(OffsetDateTime::now_utc(), self.reservation_ttl) {
            tracing::warn!(
                %scope,
                stored_name = %row.stored_name,
                created_at = %row.created_at,
                "reclaiming stale reservation"
            );
            self.metadata.release_reservation(row.image_id).await?;
            return Ok(Existing::Reclaimed(row.stored_name));
        }

        Ok(Existing::Found(StoredImage {
            fingerprint: *fingerprint,
            scope: scope.clone(),
            stored_name: row.stored_name,
        }))
    }

    async fn lookup(
        &self,
        scope: &Scope,
        fingerprint: &ContentHash,
    ) -> ApiResult<Option<StoredImage>> {
        let row = self
            .metadata
            .get_image(scope.as_str(), &fingerprint.to_hex())
            .await?;
        Ok(row.map(|row| StoredImage {
            fingerprint: *fingerprint,
            scope: scope.clone(),
            stored_name: row.stored_name,
        }))
    }

    /// Drop a reservation after a failed write; the original error wins.
    async fn release(&self, row: &ImageRow) {
        if let Err(e) = self.metadata.release_reservation(row.image_id).await {
            tracing::error!(
                image_id = %row.image_id,
                error = %e,
                "failed to release reservation"
            );
        }
    }

    fn already_exists(&self, image: StoredImage) -> UploadOutcome {
        UploadOutcome::AlreadyExists {
            url: self.url_for(&image),
            image,
        }
    }
}
