//! Health check handler.

use axum::Json;
use axum::extract::State;

use crate::dto::response::{ApiResponse, HealthResponse};
use crate::state::AppState;

/// GET /health/check
pub async fn check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let store = state.stores.store.health_check().await.unwrap_or(false);
    let stats = state.engine.stats();

    Json(ApiResponse::ok(HealthResponse {
        status: if store { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        process_id: stats.process_id,
        store,
        connections: stats.connections,
        subjects: stats.subjects,
    }))
}
