//! # lumen-api
//!
//! HTTP API layer for Lumen built on Axum.
//!
//! Provides the guard middleware, the auth, publish, presence, and health
//! endpoints, the WebSocket upgrade, and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_state, build_state_with_accounts};
pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
