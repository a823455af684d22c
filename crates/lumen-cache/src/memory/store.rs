//! In-memory shared store for single-node deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;

use lumen_core::error::AppError;
use lumen_core::result::AppResult;
use lumen_core::traits::cache::CacheProvider;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory store with per-key expiry.
///
/// Expiry is measured with [`tokio::time::Instant`], so tests can drive
/// TTLs with `tokio::time::pause` and `advance`. Cloning shares the
/// underlying map, which is how tests model several processes talking
/// to one store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a key, if it exists.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wrong_type(key: &str) -> AppError {
        AppError::internal(format!("Key '{key}' holds a value of another type"))
    }
}

#[async_trait]
impl CacheProvider for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Text(text) => Ok(Some(text.clone())),
                Value::Hash(_) => Err(Self::wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let now = Instant::now();
        Ok(self.entries.get(key).is_some_and(|e| e.is_live(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<()> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.is_live(now) {
                    entry.value = Value::Hash(HashMap::new());
                }
                match &mut entry.value {
                    Value::Hash(fields) => {
                        fields.insert(field.to_string(), value.to_string());
                    }
                    Value::Text(_) => return Err(Self::wrong_type(key)),
                }
                entry.expires_at = now + ttl;
            }
            MapEntry::Vacant(vacant) => {
                let mut fields = HashMap::new();
                fields.insert(field.to_string(), value.to_string());
                vacant.insert(Entry {
                    value: Value::Hash(fields),
                    expires_at: now + ttl,
                });
            }
        }
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> AppResult<bool> {
        let now = Instant::now();
        let (removed, now_empty) = match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => match &mut entry.value {
                Value::Hash(fields) => {
                    let removed = fields.remove(field).is_some();
                    (removed, fields.is_empty())
                }
                Value::Text(_) => return Err(Self::wrong_type(key)),
            },
            _ => (false, false),
        };
        if now_empty {
            self.entries
                .remove_if(key, |_, e| matches!(&e.value, Value::Hash(f) if f.is_empty()));
        }
        Ok(removed)
    }

    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Hash(fields) => Ok(fields.clone()),
                Value::Text(_) => Err(Self::wrong_type(key)),
            },
            _ => Ok(HashMap::new()),
        }
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.exists("k").await.unwrap());

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!store.exists("k").await.unwrap());
        assert!(!store.expire("k", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hash_set_refreshes_ttl() {
        let store = MemoryStore::new();
        store
            .hash_set("h", "a", "1", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        store
            .hash_set("h", "b", "2", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        let all = store.hash_get_all("h").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("a").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_hash_delete_removes_empty_hash() {
        let store = MemoryStore::new();
        store
            .hash_set("h", "a", "1", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(store.hash_delete("h", "a").await.unwrap());
        assert!(!store.hash_delete("h", "a").await.unwrap());
        assert!(!store.exists("h").await.unwrap());
        assert!(store.hash_get_all("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(10)).await.unwrap();
        assert!(store.hash_get_all("k").await.is_err());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set("k", "v", Duration::from_secs(10)).await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), Some("v".to_string()));
    }
}
