//! Guard middleware: runs the session guard for a route group and attaches
//! the resulting [`SessionIdentity`](lumen_auth::SessionIdentity).

use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use lumen_auth::extract_credential;
use lumen_core::types::Guard;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Routes for end users.
pub async fn require_api(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, Guard::Api, request, next).await
}

/// Routes for administrators.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, Guard::Admin, request, next).await
}

/// Routes for third-party integrations.
pub async fn require_open(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, Guard::Open, request, next).await
}

async fn authorize(
    state: &AppState,
    guard: Guard,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let query_token = Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.token);

    let raw = extract_credential(header.as_deref(), query_token.as_deref());
    let identity = state.guard.authorize(raw, guard).await?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
