//! Health check endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::notification::QueueOrder;
use crate::server::AppState;
use crate::store::StoreHealth;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: StoreHealth,
    pub queue_order: QueueOrder,
    pub topic: String,
}

/// GET /health - 200 when the store is reachable, 503 otherwise
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.store.health().await;
    let (status_code, status) = if store.connected {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        store,
        queue_order: state.broker.queue_order(),
        topic: state.channel.topic().to_string(),
    };

    (status_code, Json(body))
}
