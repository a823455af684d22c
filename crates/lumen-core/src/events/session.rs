//! Session-related domain events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Guard, SubjectId};

/// Why a credential was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// The holder logged out.
    Logout,
    /// The credential was exchanged for a fresh one.
    Refresh,
    /// An administrator revoked it.
    Admin,
}

/// Events related to credential sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A subject logged in and received a credential.
    LoginOccurred {
        /// The subject who logged in.
        subject_id: SubjectId,
        /// The guard the credential was issued for.
        guard: Guard,
        /// Client IP address as seen by the server.
        ip_address: String,
        /// Client platform label (web, ios, android, ...).
        platform: String,
        /// Raw `User-Agent` header.
        user_agent: String,
    },
    /// A credential was revoked before its natural expiry.
    CredentialRevoked {
        /// Owner of the credential.
        subject_id: SubjectId,
        /// The `jti` of the revoked credential.
        credential_id: Uuid,
        /// Guard of the revoked credential.
        guard: Guard,
        /// Why it was revoked.
        reason: RevocationReason,
    },
}

impl SessionEvent {
    /// The subject this event is about.
    pub fn subject_id(&self) -> SubjectId {
        match self {
            Self::LoginOccurred { subject_id, .. } | Self::CredentialRevoked { subject_id, .. } => {
                *subject_id
            }
        }
    }
}
