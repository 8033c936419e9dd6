//! Database models mapping to the metadata schema.

use picstore_core::{ContentHash, Scope};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Index row lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    /// Reserved by an in-flight upload; the file may not exist yet.
    Pending,
    /// File persisted and visible to lookups.
    Committed,
}

impl ImageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
        }
    }
}

/// Image index record.
#[derive(Debug, Clone, FromRow)]
pub struct ImageRow {
    pub image_id: Uuid,
    pub scope: String,
    /// Lowercase SHA-256 hex of the content.
    pub fingerprint: String,
    pub stored_name: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub state: String,
    pub created_at: OffsetDateTime,
    pub committed_at: Option<OffsetDateTime>,
}

impl ImageRow {
    /// New pending reservation created at `now`.
    ///
    /// `size_bytes` is the SQLite INTEGER column type; callers convert from
    /// the body length and reject what does not fit.
    pub fn pending(
        scope: &Scope,
        fingerprint: &ContentHash,
        stored_name: &str,
        size_bytes: i64,
        content_type: Option<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            image_id: Uuid::new_v4(),
            scope: scope.as_str().to_string(),
            fingerprint: fingerprint.to_hex(),
            stored_name: stored_name.to_string(),
            size_bytes,
            content_type,
            state: ImageState::Pending.as_str().to_string(),
            created_at: now,
            committed_at: None,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state == ImageState::Committed.as_str()
    }

    /// Whether this is a pending reservation older than `ttl` at `now`.
    ///
    /// A TTL reaching before the earliest representable date never expires.
    pub fn is_stale(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        self.state == ImageState::Pending.as_str()
            && now
                .checked_sub(ttl)
                .is_some_and(|cutoff| self.created_at < cutoff)
    }
}
