//! Probes for process supervisors, plus a status page listing each
//! collection's event count and index size.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Ready once every configured collection can be read.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if collections_readable(&state).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let readable = collections_readable(&state).await;
    let stats = state.engine.stats().await;

    Json(HealthResponse {
        status: if readable { "healthy" } else { "unhealthy" }.to_string(),
        collections: stats.collections,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn collections_readable(state: &AppState) -> bool {
    for name in state.engine.collection_names() {
        if let Err(e) = state.engine.read(&name).await {
            tracing::warn!(collection = %name, "Collection unreadable: {}", e);
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }
}
