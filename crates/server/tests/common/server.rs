//! Server test utilities.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use picstore_core::config::AppConfig;
use picstore_metadata::{MetadataStore, SqliteStore};
use picstore_server::{AppState, create_router};
use picstore_storage::{FilesystemBackend, ObjectStore};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use super::fixtures::{Part, multipart_request};

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and index.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(temp_dir.path().join("images"))
                .await
                .expect("Failed to create storage backend"),
        );
        Self::build(temp_dir, storage, modifier).await
    }

    /// Create a test server over a caller-supplied object store.
    ///
    /// `make_storage` receives the images root inside the temp directory.
    pub async fn with_storage<F, Fut>(make_storage: F) -> Self
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: std::future::Future<Output = Arc<dyn ObjectStore>>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage = make_storage(temp_dir.path().join("images")).await;
        Self::build(temp_dir, storage, |_| {}).await
    }

    /// Create a test server over a caller-supplied image index.
    ///
    /// `make_metadata` receives the database path inside the temp directory.
    pub async fn with_metadata<F, Fut>(make_metadata: F) -> Self
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: std::future::Future<Output = Arc<dyn MetadataStore>>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(temp_dir.path().join("images"))
                .await
                .expect("Failed to create storage backend"),
        );
        let metadata = make_metadata(temp_dir.path().join("images.db")).await;
        Self::build_with(temp_dir, storage, metadata, |_| {})
    }

    async fn build<F>(temp_dir: TempDir, storage: Arc<dyn ObjectStore>, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp_dir.path().join("images.db"))
                .await
                .expect("Failed to create metadata store"),
        );
        Self::build_with(temp_dir, storage, metadata, modifier)
    }

    fn build_with<F>(
        temp_dir: TempDir,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        modifier: F,
    ) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = AppConfig::for_testing(temp_dir.path());
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata).expect("Failed to create state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            temp_dir,
        }
    }

    /// Get access to the underlying image index.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Root directory of stored files.
    pub fn images_root(&self) -> PathBuf {
        self.temp_dir.path().join("images")
    }

    /// Files stored directly under `scope`, sorted.
    pub fn files_in(&self, scope: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.images_root().join(scope))
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

    /// Send a request and decode the JSON envelope.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    /// POST an `image` part to `uri`.
    pub async fn upload(&self, uri: &str, file_name: &str, data: &[u8]) -> (StatusCode, Value) {
        self.send(multipart_request(uri, &[Part::image(file_name, data)]))
            .await
    }

    /// GET `uri` returning the raw body.
    pub async fn get_raw(&self, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body)
    }
}
