//! Core domain types and shared logic for picstore.
//!
//! This crate defines the data model used across all other crates:
//! - Content fingerprints (SHA-256)
//! - Storage scopes and sanitized stored file names
//! - Stored image records and public URL derivation
//! - Configuration types

pub mod config;
pub mod error;
pub mod hash;
pub mod image;

pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use image::{DEFAULT_SCOPE, Scope, StoredImage, StoredName, object_key, public_url};

/// Maximum upload body size: 100 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 100 * 1024 * 1024;

/// Multipart form field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "image";
