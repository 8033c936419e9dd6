//! Health endpoint.

use crate::error::ApiResult;
use crate::response::{Envelope, HealthInfo};
use crate::state::AppState;
use axum::extract::State;

/// GET /health - Check the image index and the storage root.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Envelope<HealthInfo>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;

    Ok(Envelope::ok(
        "ok",
        HealthInfo {
            version: env!("CARGO_PKG_VERSION"),
        },
    ))
}
