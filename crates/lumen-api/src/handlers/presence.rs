//! Presence lookup for administrators.

use axum::Json;
use axum::extract::{Path, State};

use lumen_core::types::SubjectId;

use crate::dto::response::{ApiResponse, PresenceResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /admin/v1/presence/{subject}
pub async fn lookup(
    State(state): State<AppState>,
    Path(subject): Path<i64>,
) -> Result<Json<ApiResponse<PresenceResponse>>, ApiError> {
    let subject_id = SubjectId(subject);
    let connections = state.engine.registry.lookup(subject_id).await?;
    Ok(Json(ApiResponse::ok(PresenceResponse {
        subject_id,
        online: !connections.is_empty(),
        connections,
    })))
}
