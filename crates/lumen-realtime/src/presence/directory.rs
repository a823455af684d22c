//! Shared presence directory.
//!
//! Layout in the shared store:
//!
//! - `presence:{subject}` is a hash with one field per live connection,
//!   `{process}/{instance}`, whose value is the registration time in ms.
//!   The whole hash expires after the lease TTL unless refreshed.
//! - `node:{process}` is the liveness lease of a process. A record whose
//!   process has no lease is stale: lookups skip it and delete it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use lumen_cache::keys;
use lumen_core::result::AppResult;
use lumen_core::traits::CacheProvider;
use lumen_core::types::{ClientInstanceId, ProcessId, SubjectId};

/// One `(subject, instance) → process` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceRecord {
    /// Owner of the connection.
    pub subject_id: SubjectId,
    /// Device or tab of the owner.
    pub instance: ClientInstanceId,
    /// Process holding the socket.
    pub process_id: ProcessId,
}

/// Keyed access to presence records and process leases.
#[derive(Debug, Clone)]
pub struct PresenceDirectory {
    store: Arc<dyn CacheProvider>,
    lease_ttl: Duration,
}

impl PresenceDirectory {
    /// Create a directory whose records and leases live for `lease_ttl`.
    pub fn new(store: Arc<dyn CacheProvider>, lease_ttl: Duration) -> Self {
        Self { store, lease_ttl }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<dyn CacheProvider> {
        &self.store
    }

    /// Upsert a record and push back the expiry of the subject's hash.
    pub async fn upsert(
        &self,
        subject_id: SubjectId,
        process_id: &ProcessId,
        instance: &ClientInstanceId,
    ) -> AppResult<()> {
        self.store
            .hash_set(
                &keys::presence(subject_id),
                &keys::presence_field(process_id, instance),
                &Utc::now().timestamp_millis().to_string(),
                self.lease_ttl,
            )
            .await
    }

    /// Delete a record. Returns `true` if it existed.
    pub async fn remove(
        &self,
        subject_id: SubjectId,
        process_id: &ProcessId,
        instance: &ClientInstanceId,
    ) -> AppResult<bool> {
        self.store
            .hash_delete(
                &keys::presence(subject_id),
                &keys::presence_field(process_id, instance),
            )
            .await
    }

    /// Every live record of a subject.
    ///
    /// Records of processes without a live lease are left out and deleted.
    pub async fn lookup(&self, subject_id: SubjectId) -> AppResult<Vec<PresenceRecord>> {
        let key = keys::presence(subject_id);
        let fields = self.store.hash_get_all(&key).await?;

        let mut leases: HashMap<ProcessId, bool> = HashMap::new();
        let mut records = Vec::with_capacity(fields.len());
        for field in fields.keys() {
            let Some((process_id, instance)) = keys::parse_presence_field(field) else {
                warn!(key = %key, field = %field, "Dropping malformed presence field");
                self.forget(&key, field).await;
                continue;
            };

            let alive = match leases.get(&process_id) {
                Some(alive) => *alive,
                None => {
                    let alive = self.store.exists(&keys::node_lease(&process_id)).await?;
                    leases.insert(process_id.clone(), alive);
                    alive
                }
            };
            if !alive {
                warn!(
                    subject_id = %subject_id,
                    process_id = %process_id,
                    instance = %instance,
                    "Dropping presence record of lapsed process"
                );
                self.forget(&key, field).await;
                continue;
            }

            records.push(PresenceRecord {
                subject_id,
                instance,
                process_id,
            });
        }
        records.sort_by(|a, b| (&a.process_id, &a.instance).cmp(&(&b.process_id, &b.instance)));
        Ok(records)
    }

    /// Renew the liveness lease of a process.
    pub async fn renew_lease(&self, process_id: &ProcessId) -> AppResult<()> {
        self.store
            .set(
                &keys::node_lease(process_id),
                &Utc::now().timestamp_millis().to_string(),
                self.lease_ttl,
            )
            .await
    }

    /// Drop the liveness lease of a process.
    pub async fn release_lease(&self, process_id: &ProcessId) -> AppResult<()> {
        self.store.delete(&keys::node_lease(process_id)).await
    }

    async fn forget(&self, key: &str, field: &str) {
        if let Err(e) = self.store.hash_delete(key, field).await {
            debug!(key = %key, field = %field, error = %e, "Failed to delete stale presence field");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_cache::memory::MemoryStore;

    fn pid(s: &str) -> ProcessId {
        ProcessId::new(s).unwrap()
    }

    fn inst(s: &str) -> ClientInstanceId {
        ClientInstanceId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_skips_and_deletes_lapsed_processes() {
        let store = MemoryStore::new();
        let dir = PresenceDirectory::new(Arc::new(store.clone()), Duration::from_secs(30));

        dir.renew_lease(&pid("p1")).await.unwrap();
        dir.upsert(SubjectId(42), &pid("p1"), &inst("dev1")).await.unwrap();
        dir.upsert(SubjectId(42), &pid("p2"), &inst("dev2")).await.unwrap();

        let records = dir.lookup(SubjectId(42)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].process_id, pid("p1"));

        let raw = store.hash_get_all(&keys::presence(SubjectId(42))).await.unwrap();
        assert_eq!(raw.len(), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = PresenceDirectory::new(Arc::new(MemoryStore::new()), Duration::from_secs(30));
        dir.renew_lease(&pid("p1")).await.unwrap();
        dir.upsert(SubjectId(1), &pid("p1"), &inst("a")).await.unwrap();
        assert!(dir.remove(SubjectId(1), &pid("p1"), &inst("a")).await.unwrap());
        assert!(dir.lookup(SubjectId(1)).await.unwrap().is_empty());
    }
}
