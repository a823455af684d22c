//! Application builder: wires stores, auth and the real-time engine into
//! the state every handler shares.

use std::sync::Arc;

use tracing::info;

use lumen_auth::{
    AccountVerifier, JwtDecoder, JwtEncoder, RevocationStore, SessionGuard, SessionService,
    StaticAccounts,
};
use lumen_cache::StoreManager;
use lumen_core::config::AppConfig;
use lumen_core::traits::DomainEventPublisher;
use lumen_core::types::ProcessId;
use lumen_realtime::RealtimeEngine;

use crate::state::AppState;

/// Build the state of one process with the accounts listed in
/// configuration.
pub fn build_state(config: AppConfig, stores: StoreManager, process_id: ProcessId) -> AppState {
    let accounts: Arc<dyn AccountVerifier> =
        Arc::new(StaticAccounts::from_config(&config.auth.accounts));
    build_state_with_accounts(config, stores, process_id, accounts)
}

/// Build the state of one process around an external account verifier.
pub fn build_state_with_accounts(
    config: AppConfig,
    stores: StoreManager,
    process_id: ProcessId,
    accounts: Arc<dyn AccountVerifier>,
) -> AppState {
    // ── Real-time engine ─────────────────────────────────────
    let engine = RealtimeEngine::new(process_id.clone(), &config.realtime, &stores);

    // ── Auth ─────────────────────────────────────────────────
    let revocations = RevocationStore::new(stores.store.clone(), &config.auth.revocation);
    let guard = SessionGuard::new(
        &config.auth,
        JwtDecoder::new(&config.auth),
        revocations.clone(),
    );
    let publisher: Arc<dyn DomainEventPublisher> = Arc::new(engine.bus.clone());
    let sessions = SessionService::new(
        JwtEncoder::new(&config.auth),
        revocations,
        accounts,
        publisher,
    );

    info!(process_id = %process_id, "Application state initialized");

    AppState {
        config: Arc::new(config),
        process_id,
        stores,
        guard: Arc::new(guard),
        sessions: Arc::new(sessions),
        engine,
    }
}
