//! Configuration types shared across crates.

use crate::image::{DEFAULT_SCOPE, Scope};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base address prepended to every returned image URL.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Maximum request body size in bytes, enforced before the upload handler runs.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Scope used for `POST /upload` without a path segment.
    #[serde(default = "default_scope")]
    pub default_scope: String,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Age in seconds after which a pending index reservation is considered
    /// abandoned and may be reclaimed by a new upload of the same content.
    #[serde(default = "default_reservation_ttl_secs")]
    pub reservation_ttl_secs: u64,
    /// Cross-origin policy.
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_bind() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_max_body_size() -> usize {
    crate::DEFAULT_MAX_BODY_SIZE
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_reservation_ttl_secs() -> u64 {
    300 // 5 minutes
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: default_public_base_url(),
            max_body_size: default_max_body_size(),
            default_scope: default_scope(),
            metrics_enabled: default_metrics_enabled(),
            reservation_ttl_secs: default_reservation_ttl_secs(),
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Get the reservation TTL as a Duration.
    ///
    /// Values past `i64::MAX` seconds saturate. Callers subtracting the TTL
    /// from a timestamp must use checked arithmetic.
    pub fn reservation_ttl(&self) -> Duration {
        let secs = i64::try_from(self.reservation_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Public base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }

    /// Parsed default scope.
    pub fn default_scope(&self) -> crate::Result<Scope> {
        Scope::parse(&self.default_scope)
    }

    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.public_base_url.starts_with("http://")
            || self.public_base_url.starts_with("https://"))
        {
            return Err(format!(
                "server.public_base_url must start with http:// or https://, got {:?}",
                self.public_base_url
            ));
        }
        if self.max_body_size == 0 {
            return Err("server.max_body_size cannot be 0".to_string());
        }
        self.default_scope()
            .map_err(|e| format!("server.default_scope: {e}"))?;
        Ok(())
    }
}

/// CORS configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Attach a CORS layer to the router.
    #[serde(default = "default_cors_enabled")]
    pub enabled: bool,
    /// Allowed origins. `["*"]` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_cors_enabled() -> bool {
    true
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_cors_enabled(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl CorsConfig {
    /// Whether any origin is allowed.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory; files land at `{path}/{scope}/{stored_name}`.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./images"),
        }
    }
}

/// Metadata (persistent index) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./images.db"),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at `dir`.
    ///
    /// **For testing only.**
    pub fn for_testing(dir: &std::path::Path) -> Self {
        Self {
            server: ServerConfig {
                public_base_url: "http://test.local".to_string(),
                ..ServerConfig::default()
            },
            storage: StorageConfig::Filesystem {
                path: dir.join("images"),
            },
            metadata: MetadataConfig::Sqlite {
                path: dir.join("images.db"),
            },
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> crate::Result<()> {
        self.server.validate().map_err(crate::Error::Config)
    }
}
