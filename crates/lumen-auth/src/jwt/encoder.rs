//! Credential creation with per-guard TTL and issuer.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use uuid::Uuid;

use lumen_core::config::{AuthConfig, GuardsConfig};
use lumen_core::error::AppError;
use lumen_core::types::{Guard, SubjectId};

use super::claims::Claims;

/// Creates signed HS256 credentials.
#[derive(Clone)]
pub struct JwtEncoder {
    /// HMAC secret key for signing.
    encoding_key: EncodingKey,
    /// Per-guard TTL and issuer.
    guards: GuardsConfig,
}

impl std::fmt::Debug for JwtEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtEncoder")
            .field("guards", &self.guards)
            .finish()
    }
}

/// A freshly issued credential.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    /// The signed credential string.
    pub token: String,
    /// Credential id (`jti`).
    pub credential_id: Uuid,
    /// Subject the credential belongs to.
    pub subject_id: SubjectId,
    /// Guard the credential is valid for.
    pub guard: Guard,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
}

impl JwtEncoder {
    /// Creates a new encoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            guards: config.guards.clone(),
        }
    }

    /// Issue a credential using the configured TTL and issuer of `guard`.
    pub fn issue_for_guard(
        &self,
        subject_id: SubjectId,
        guard: Guard,
    ) -> Result<IssuedCredential, AppError> {
        let settings = self.guards.get(guard);
        self.issue(
            subject_id,
            guard,
            TimeDelta::seconds(settings.ttl_seconds as i64),
            &settings.issuer,
        )
    }

    /// Issue a credential valid for `ttl` from now.
    pub fn issue(
        &self,
        subject_id: SubjectId,
        guard: Guard,
        ttl: TimeDelta,
        issuer: &str,
    ) -> Result<IssuedCredential, AppError> {
        self.issue_at(subject_id, guard, ttl, issuer, Utc::now())
    }

    /// Issue a credential as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject_id: SubjectId,
        guard: Guard,
        ttl: TimeDelta,
        issuer: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredential, AppError> {
        if ttl <= TimeDelta::zero() {
            return Err(AppError::validation("Credential TTL must be positive"));
        }
        let expires_at = now + ttl;
        let claims = Claims {
            sub: subject_id.to_string(),
            guard,
            iss: issuer.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode credential: {e}")))?;

        Ok(IssuedCredential {
            token,
            credential_id: claims.jti,
            subject_id,
            guard,
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        })
    }
}
