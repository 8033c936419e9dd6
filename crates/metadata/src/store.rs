//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::ImageRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: ImageRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and migrate it.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // A single connection serializes writers so concurrent uploads never
        // see "database is locked"; uniqueness is still enforced by the schema.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "opened sqlite image index");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::{ImageRow, ImageState};
    use time::OffsetDateTime;
    use tracing::instrument;
    use uuid::Uuid;

    /// Map a UNIQUE violation on `images` to the matching domain error.
    ///
    /// SQLite reports table constraints as
    /// "UNIQUE constraint failed: images.scope, images.fingerprint".
    fn classify_insert_error(err: sqlx::Error, image: &ImageRow) -> MetadataError {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.message().contains("UNIQUE constraint")
        {
            let msg = db_err.message();
            if msg.contains("images.fingerprint") {
                return MetadataError::DuplicateFingerprint(format!(
                    "{}/{}",
                    image.scope, image.fingerprint
                ));
            }
            if msg.contains("images.stored_name") {
                return MetadataError::DuplicateName(format!(
                    "{}/{}",
                    image.scope, image.stored_name
                ));
            }
        }
        err.into()
    }

    #[async_trait]
    impl ImageRepo for SqliteStore {
        async fn get_image(
            &self,
            scope: &str,
            fingerprint: &str,
        ) -> MetadataResult<Option<ImageRow>> {
            let row = sqlx::query_as::<_, ImageRow>(
                "SELECT * FROM images WHERE scope = ? AND fingerprint = ?",
            )
            .bind(scope)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        #[instrument(
            skip(self, image),
            fields(scope = %image.scope, stored_name = %image.stored_name)
        )]
        async fn reserve_image(&self, image: &ImageRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO images (
                    image_id, scope, fingerprint, stored_name, size_bytes,
                    content_type, state, created_at, committed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(image.image_id)
            .bind(&image.scope)
            .bind(&image.fingerprint)
            .bind(&image.stored_name)
            .bind(image.size_bytes)
            .bind(&image.content_type)
            .bind(&image.state)
            .bind(image.created_at)
            .bind(image.committed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_insert_error(e, image))?;
            Ok(())
        }

        #[instrument(skip(self, committed_at))]
        async fn commit_image(
            &self,
            image_id: Uuid,
            committed_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE images SET state = ?, committed_at = ? WHERE image_id = ? AND state = ?",
            )
            .bind(ImageState::Committed.as_str())
            .bind(committed_at)
            .bind(image_id)
            .bind(ImageState::Pending.as_str())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                let state: Option<String> =
                    sqlx::query_scalar("SELECT state FROM images WHERE image_id = ?")
                        .bind(image_id)
                        .fetch_optional(&self.pool)
                        .await?;
                return Err(match state {
                    Some(from) => MetadataError::InvalidStateTransition {
                        from,
                        to: ImageState::Committed.as_str().to_string(),
                    },
                    None => MetadataError::NotFound(format!("image {image_id}")),
                });
            }
            Ok(())
        }

        #[instrument(skip(self))]
        async fn release_reservation(&self, image_id: Uuid) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM images WHERE image_id = ? AND state = ?")
                .bind(image_id)
                .bind(ImageState::Pending.as_str())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn count_images(&self, scope: Option<&str>) -> MetadataResult<u64> {
            let count: i64 = match scope {
                Some(scope) => {
                    sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE scope = ?")
                        .bind(scope)
                        .fetch_one(&self.pool)
                        .await?
                }
                None => {
                    sqlx::query_scalar("SELECT COUNT(*) FROM images")
                        .fetch_one(&self.pool)
                        .await?
                }
            };
            Ok(u64::try_from(count).unwrap_or(0))
        }
    }
}

/// SQLite schema.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    image_id BLOB PRIMARY KEY,
    scope TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    stored_name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    content_type TEXT,
    state TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    committed_at TEXT,
    UNIQUE (scope, fingerprint),
    UNIQUE (scope, stored_name)
);
CREATE INDEX IF NOT EXISTS idx_images_state ON images(state);
"#;
