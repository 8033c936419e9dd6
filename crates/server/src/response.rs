//! Uniform JSON envelope returned by every endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::collections::BTreeMap;

/// `{status, message, data}` envelope. `status` mirrors the HTTP status.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            data,
        }
    }

    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::new(StatusCode::OK, message, Some(data))
    }
}

impl Envelope<()> {
    /// Envelope with `data: null`.
    pub fn empty(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, message, None)
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Multipart part headers, keyed by lowercase header name.
pub type PartHeaders = BTreeMap<String, Vec<String>>;

/// Payload for a newly stored image.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub image_name: String,
    pub image_url: String,
    pub header: PartHeaders,
    pub size: u64,
}

/// Payload for content that was already stored.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingImage {
    pub image_url: String,
}

/// Payload for the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthInfo {
    pub version: &'static str,
}
