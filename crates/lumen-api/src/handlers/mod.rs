//! HTTP and WebSocket handlers.

pub mod auth;
pub mod health;
pub mod presence;
pub mod talk;
pub mod ws;
