//! Common test utilities.

use picstore_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A filesystem store rooted in a temp directory that is removed on drop.
#[allow(dead_code)]
pub struct TestStorage {
    pub backend: Arc<dyn ObjectStore>,
    pub temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStorage {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let backend = FilesystemBackend::new(temp_dir.path())
            .await
            .expect("Failed to create storage backend");

        Self {
            backend: Arc::new(backend),
            temp_dir,
        }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.backend.clone()
    }

    /// Raw bytes of the file stored at `key`.
    pub fn read(&self, key: &str) -> Vec<u8> {
        std::fs::read(self.temp_dir.path().join(key)).expect("Failed to read stored file")
    }

    /// Files directly under `scope`, sorted.
    pub fn files_in(&self, scope: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.temp_dir.path().join(scope))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
