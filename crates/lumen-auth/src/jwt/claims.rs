//! Claims carried by every Lumen credential.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lumen_core::types::{Guard, SubjectId};

use crate::error::AuthError;

/// JWT claims payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject id, as a decimal string.
    pub sub: String,
    /// Guard the credential was issued for.
    pub guard: Guard,
    /// Issuer of the guard.
    pub iss: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Credential id, the key of revocation entries.
    pub jti: Uuid,
}

impl Claims {
    /// Parse the subject claim.
    pub fn subject_id(&self) -> Result<SubjectId, AuthError> {
        self.sub.parse().map_err(|_| AuthError::Malformed)
    }

    /// Returns the expiration as a `DateTime<Utc>`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns the issue time as a `DateTime<Utc>`.
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Remaining lifetime at `now`; negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        self.expires_at() - now
    }
}
