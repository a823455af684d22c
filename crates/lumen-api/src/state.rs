//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use lumen_auth::{SessionGuard, SessionService};
use lumen_cache::StoreManager;
use lumen_core::config::AppConfig;
use lumen_core::types::ProcessId;
use lumen_realtime::RealtimeEngine;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    // ── Configuration ────────────────────────────────────────
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Identity of this process
    pub process_id: ProcessId,

    // ── Infrastructure ───────────────────────────────────────
    /// Shared store and pub/sub
    pub stores: StoreManager,

    // ── Auth ─────────────────────────────────────────────────
    /// Request guard
    pub guard: Arc<SessionGuard>,
    /// Login, logout and refresh
    pub sessions: Arc<SessionService>,

    // ── Real-time ────────────────────────────────────────────
    /// Connections, presence and delivery
    pub engine: RealtimeEngine,
}
