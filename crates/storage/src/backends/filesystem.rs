//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem object store.
///
/// Objects live at `{root}/{key}`; a key's directory components are the
/// image scope.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path inside the root.
    ///
    /// Runs the symlink checks on the blocking pool since they stat and
    /// canonicalize.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || resolve_key(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Temp file next to `path`, unique per write.
    fn temp_path(path: &Path) -> PathBuf {
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or(temp_name),
        )
    }

    /// Write `data` to a fresh temp file next to `path` and fsync it.
    async fn write_temp(path: &Path, data: &[u8]) -> StorageResult<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = Self::temp_path(path);
        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(temp_path)
    }
}

/// Validate `key` and join it onto `root`.
///
/// Only normal components are accepted. Existing paths and the nearest
/// existing ancestor of new paths must canonicalize inside the root, which
/// rejects symlinks pointing outside it.
fn resolve_key(root: &Path, key: &str) -> StorageResult<PathBuf> {
    if key.is_empty() || key.starts_with('/') || key.starts_with('\\') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!("invalid key: {key:?}")));
    }
    if !Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(format!(
            "contains unsafe path component: {key}"
        )));
    }

    let root_canonical = root.canonicalize().map_err(|e| {
        StorageError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to canonicalize root: {e}"),
        ))
    })?;
    let path = root.join(key);

    let mut current = path.as_path();
    loop {
        match std::fs::symlink_metadata(current) {
            Ok(meta) => {
                let canonical = current.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!("symlink target missing: {key}"))
                    } else {
                        StorageError::Io(e)
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(StorageError::Io(err)),
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return Ok(path),
        }
    }
}

fn not_found_or_io(key: &str, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(key, e))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        Ok(ObjectMeta {
            size: metadata.len(),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(key, e))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        if fs::try_exists(&path).await.map_err(StorageError::Io)? {
            return Ok(false);
        }

        // hard_link fails with AlreadyExists instead of replacing, so the
        // final path is claimed atomically even under concurrent writers.
        let temp_path = Self::write_temp(&path, &data).await?;
        let linked = fs::hard_link(&temp_path, &path).await;
        let _ = fs::remove_file(&temp_path).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
