//! HTTP API server for picstore.
//!
//! This crate provides:
//! - Multipart image upload with per-scope content deduplication
//! - Static serving of stored images
//! - Uniform `{status, message, data}` JSON responses
//! - Health and Prometheus metrics endpoints

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod response;
pub mod routes;
pub mod state;
pub mod upload;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
pub use upload::{Upload, UploadOutcome, UploadService};
