//! Route definitions for the Lumen HTTP API.
//!
//! End-user routes live under `/api/v1` behind the `api` guard, admin
//! routes under `/admin/v1` behind `admin`, integration routes under
//! `/open/v1` behind `open`. Login and health are public; the WebSocket
//! upgrade is guarded by `api`.

use axum::{
    Router,
    extract::Request,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::middleware::cors::build_cors_layer;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);

    Router::new()
        .nest("/api/v1", api_routes(&state))
        .nest("/admin/v1", admin_routes(&state))
        .nest("/open/v1", open_routes(&state))
        .merge(ws_routes(&state))
        .merge(health_routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| middleware::logging::http_span(request)),
        )
        .layer(cors)
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

/// End-user endpoints.
fn api_routes(state: &AppState) -> Router<AppState> {
    let guarded = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/talk/publish", post(handlers::talk::publish))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api,
        ));

    Router::new()
        .route("/auth/login", post(handlers::auth::login_api))
        .merge(guarded)
}

/// Admin endpoints.
fn admin_routes(state: &AppState) -> Router<AppState> {
    let guarded = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/presence/{subject}", get(handlers::presence::lookup))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin,
        ));

    Router::new()
        .route("/auth/login", post(handlers::auth::login_admin))
        .merge(guarded)
}

/// Third-party integration endpoints.
fn open_routes(state: &AppState) -> Router<AppState> {
    let guarded = Router::new()
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/talk/publish", post(handlers::talk::publish))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_open,
        ));

    Router::new()
        .route("/auth/login", post(handlers::auth::login_open))
        .merge(guarded)
}

/// WebSocket upgrade.
fn ws_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/ws", get(handlers::ws::ws_upgrade))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api,
        ))
}

/// Health endpoints.
fn health_routes() -> Router<AppState> {
    Router::new().route("/health/check", get(handlers::health::check))
}
