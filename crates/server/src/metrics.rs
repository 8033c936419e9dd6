//! Prometheus metrics for the picstore server.
//!
//! Exposes upload, deduplication and latency metrics. Labels never carry
//! scopes, names or fingerprints.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static IMAGES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "picstore_images_uploaded_total",
        "Total number of images stored",
    )
    .expect("metric creation failed")
});

pub static IMAGES_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "picstore_images_deduplicated_total",
        "Total number of uploads answered with an existing image",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "picstore_bytes_uploaded_total",
        "Total bytes written for new images",
    )
    .expect("metric creation failed")
});

pub static NAME_COLLISIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "picstore_name_collisions_total",
        "Total number of stored name candidates skipped because the name was taken",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "picstore_upload_errors_total",
            "Total upload errors by error kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "picstore_upload_duration_seconds",
            "Time taken to handle an upload after the body was read",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(IMAGES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMAGES_DEDUPLICATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(NAME_COLLISIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record upload errors by kind.
pub fn record_upload_error(kind: &str) {
    UPLOAD_ERRORS.with_label_values(&[kind]).inc();
}
