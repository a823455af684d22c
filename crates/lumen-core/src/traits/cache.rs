//! Shared key/value store trait for pluggable backends.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// Trait for the shared store every process talks to (Redis in a cluster,
/// in-memory for a single node and tests).
///
/// Every write is a keyed upsert or delete, so concurrent writers from
/// different processes never need coordination. The provider is
/// responsible for key prefixing and TTL enforcement; unreachable
/// backends surface as [`ErrorKind::StoreUnavailable`](crate::ErrorKind).
#[async_trait]
pub trait CacheProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Upsert a value with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Set the TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// Upsert one field of a hash and reset the TTL of the whole hash,
    /// as a single atomic step.
    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration)
    -> AppResult<()>;

    /// Delete one field of a hash. Returns `true` if the field existed.
    async fn hash_delete(&self, key: &str, field: &str) -> AppResult<bool>;

    /// Read all fields of a hash. A missing key yields an empty map.
    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
