//! Auth handlers: login, logout, refresh.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use validator::Validate;

use lumen_auth::{AccessToken, LoginContext};
use lumen_core::error::AppError;
use lumen_core::types::Guard;

use crate::dto::request::LoginRequest;
use crate::dto::response::{ApiResponse, MessageResponse};
use crate::error::ApiError;
use crate::extractors::AuthSession;
use crate::state::AppState;

/// POST /api/v1/auth/login
pub async fn login_api(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AccessToken>>, ApiError> {
    login(&state, Guard::Api, &headers, req).await
}

/// POST /admin/v1/auth/login
pub async fn login_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AccessToken>>, ApiError> {
    login(&state, Guard::Admin, &headers, req).await
}

/// POST /open/v1/auth/login
pub async fn login_open(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AccessToken>>, ApiError> {
    login(&state, Guard::Open, &headers, req).await
}

async fn login(
    state: &AppState,
    guard: Guard,
    headers: &HeaderMap,
    req: LoginRequest,
) -> Result<Json<ApiResponse<AccessToken>>, ApiError> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let context = LoginContext {
        ip_address: client_ip(headers),
        platform: req.platform.clone(),
        user_agent: header_str(headers, USER_AGENT.as_str()).unwrap_or_default(),
    };
    let token = state
        .sessions
        .login(&req.username, &req.password, guard, context)
        .await?;

    Ok(Json(ApiResponse::ok(token)))
}

/// POST /{surface}/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.sessions.logout(&session).await?;
    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "Logged out successfully".to_string(),
    })))
}

/// POST /{surface}/v1/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<ApiResponse<AccessToken>>, ApiError> {
    let token = state.sessions.refresh(&session).await?;
    Ok(Json(ApiResponse::ok(token)))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn client_ip(headers: &HeaderMap) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_owned()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .unwrap_or_else(|| "unknown".to_string())
}
