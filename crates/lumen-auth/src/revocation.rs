//! Shared revocation list.
//!
//! A revoked credential is recorded as a keyed entry in the shared store
//! that lives exactly as long as the credential would have. Every process
//! answers `is_revoked` from the same store, optionally through a short
//! local cache whose staleness window is configured in milliseconds.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

use lumen_cache::keys;
use lumen_core::config::RevocationConfig;
use lumen_core::error::{AppError, ErrorKind};
use lumen_core::result::AppResult;
use lumen_core::traits::CacheProvider;

/// Revocation list backed by the shared store.
#[derive(Debug, Clone)]
pub struct RevocationStore {
    /// Shared store every process reads.
    store: Arc<dyn CacheProvider>,
    /// Local answers, kept for at most the staleness window.
    cache: Option<Cache<Uuid, bool>>,
}

impl RevocationStore {
    /// Create a revocation store. A zero staleness window disables the
    /// local cache.
    pub fn new(store: Arc<dyn CacheProvider>, config: &RevocationConfig) -> Self {
        let cache = (config.staleness_window_ms > 0).then(|| {
            Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(Duration::from_millis(config.staleness_window_ms))
                .build()
        });
        Self { store, cache }
    }

    /// Revoke a credential for `ttl`.
    ///
    /// Returns `false` without touching the store when `ttl` is not
    /// positive: such a credential is already dead.
    pub async fn revoke(&self, credential_id: Uuid, ttl: TimeDelta) -> AppResult<bool> {
        let Ok(ttl) = ttl.to_std() else {
            debug!(credential_id = %credential_id, "Skipping revocation of expired credential");
            return Ok(false);
        };
        if ttl.is_zero() {
            debug!(credential_id = %credential_id, "Skipping revocation of expired credential");
            return Ok(false);
        }

        self.store
            .set(&keys::revoked_credential(&credential_id.to_string()), "1", ttl)
            .await
            .map_err(Self::unavailable)?;

        if let Some(cache) = &self.cache {
            cache.insert(credential_id, true).await;
        }
        debug!(credential_id = %credential_id, ttl_ms = ttl.as_millis() as u64, "Credential revoked");
        Ok(true)
    }

    /// Revoke a credential for the rest of its lifetime.
    pub async fn revoke_until(
        &self,
        credential_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.revoke(credential_id, expires_at - now).await
    }

    /// Whether a credential has been revoked.
    ///
    /// Fails with `StoreUnavailable` when the store cannot answer; the
    /// caller applies its failure policy.
    pub async fn is_revoked(&self, credential_id: Uuid) -> AppResult<bool> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&credential_id).await {
                return Ok(hit);
            }
        }

        let revoked = self
            .store
            .exists(&keys::revoked_credential(&credential_id.to_string()))
            .await
            .map_err(Self::unavailable)?;

        if let Some(cache) = &self.cache {
            cache.insert(credential_id, revoked).await;
        }
        Ok(revoked)
    }

    fn unavailable(e: AppError) -> AppError {
        AppError::with_source(
            ErrorKind::StoreUnavailable,
            "Revocation store unavailable",
            e,
        )
    }
}
