//! Response DTOs.

use serde::{Deserialize, Serialize};

use lumen_core::types::{ProcessId, SubjectId};
use lumen_realtime::PresenceRecord;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Simple message response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Message.
    pub message: String,
}

/// Live connections of a subject across the cluster.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceResponse {
    /// The subject.
    pub subject_id: SubjectId,
    /// Whether any connection is live.
    pub online: bool,
    /// Every live `(instance, process)` pair.
    pub connections: Vec<PresenceRecord>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the shared store does not answer.
    pub status: &'static str,
    /// Version.
    pub version: &'static str,
    /// This process.
    pub process_id: ProcessId,
    /// Whether the shared store answered.
    pub store: bool,
    /// Live local connections.
    pub connections: usize,
    /// Subjects with a local connection.
    pub subjects: usize,
}
