//! Test fixtures for building upload requests.

use axum::body::Body;
use axum::http::Request;
use sha2::{Digest, Sha256};

/// Multipart boundary used by every test request.
pub const BOUNDARY: &str = "picstore-test-boundary";

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    data
}

/// Compute SHA-256 hash of data as hex string.
#[allow(dead_code)]
pub fn sha256_hex(data: &[u8]) -> String {
    let result = Sha256::digest(data);
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A single multipart part.
#[allow(dead_code)]
pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

#[allow(dead_code)]
impl<'a> Part<'a> {
    /// An `image` file part with an `image/png` content type.
    pub fn image(file_name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name: "image",
            file_name: Some(file_name),
            content_type: Some("image/png"),
            data,
        }
    }

    /// A plain text field.
    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            file_name: None,
            content_type: None,
            data: value.as_bytes(),
        }
    }
}

/// Encode parts as a `multipart/form-data` body.
#[allow(dead_code)]
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(file_name) = part.file_name {
            disposition.push_str(&format!("; filename=\"{file_name}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Build a multipart POST request.
#[allow(dead_code)]
pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}
