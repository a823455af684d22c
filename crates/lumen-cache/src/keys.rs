//! Key and topic builders for every shared-store entry Lumen writes.
//!
//! Centralising key construction prevents typos and makes it easy
//! to find every key the application uses. Keys are unprefixed; the
//! store provider applies the configured prefix.

use lumen_core::types::{ClientInstanceId, ProcessId, SubjectId};

// ── Revocation keys ────────────────────────────────────────

/// Key marking a credential as revoked until its natural expiry.
pub fn revoked_credential(credential_id: &str) -> String {
    format!("auth:revoked:{credential_id}")
}

// ── Presence keys ──────────────────────────────────────────

/// Hash holding every live `(process, instance)` record of a subject.
pub fn presence(subject_id: SubjectId) -> String {
    format!("presence:{subject_id}")
}

/// Field of the presence hash for one connection.
pub fn presence_field(process_id: &ProcessId, instance: &ClientInstanceId) -> String {
    format!("{process_id}/{instance}")
}

/// Split a presence field back into its owning process and instance.
pub fn parse_presence_field(field: &str) -> Option<(ProcessId, ClientInstanceId)> {
    let (process, instance) = field.split_once('/')?;
    Some((ProcessId::new(process).ok()?, ClientInstanceId::new(instance).ok()?))
}

/// Liveness lease of a process.
pub fn node_lease(process_id: &ProcessId) -> String {
    format!("node:{process_id}")
}

// ── Pub/sub topics ─────────────────────────────────────────

/// Routed delivery topic of one process.
pub fn routed_topic(process_id: &ProcessId) -> String {
    format!("comet:node:{process_id}")
}

/// Domain broadcast topic.
pub fn domain_topic(name: &str) -> String {
    format!("domain:{name}")
}
