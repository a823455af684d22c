//! Fault injection helpers for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use lumen_core::error::AppError;
use lumen_core::result::AppResult;
use lumen_core::traits::cache::CacheProvider;

use crate::memory::MemoryStore;

/// A [`MemoryStore`] wrapper that can be told to slow down or fail.
///
/// Clones share both the inner store and the fault switches, so a test
/// can keep one handle while the code under test holds another.
#[derive(Debug, Clone, Default)]
pub struct ChaosStore {
    inner: MemoryStore,
    failing: Arc<AtomicBool>,
    fail_next: Arc<AtomicU64>,
    latency_ms: Arc<AtomicU64>,
}

impl ChaosStore {
    /// Wrap an existing store.
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
            fail_next: Arc::new(AtomicU64::new(0)),
            latency_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Make every operation fail with `StoreUnavailable` (or stop failing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only the next `count` operations fail.
    pub fn fail_next(&self, count: u64) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn gate(&self) -> AppResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let one_off = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if one_off || self.failing.load(Ordering::SeqCst) {
            return Err(AppError::store_unavailable("injected store failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheProvider for ChaosStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.gate().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.gate().await?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.gate().await?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.gate().await?;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        self.gate().await?;
        self.inner.expire(key, ttl).await
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<()> {
        self.gate().await?;
        self.inner.hash_set(key, field, value, ttl).await
    }

    async fn hash_delete(&self, key: &str, field: &str) -> AppResult<bool> {
        self.gate().await?;
        self.inner.hash_delete(key, field).await
    }

    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>> {
        self.gate().await?;
        self.inner.hash_get_all(key).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self.gate().await.is_ok())
    }
}
