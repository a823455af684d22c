//! The request guard pipeline.
//!
//! A request moves through `Unauthenticated → CredentialExtracted →
//! Verified → BlacklistChecked → Authorized`, or is rejected at whichever
//! stage it reached. The guard never retries; when the revocation store
//! cannot answer, the per-guard [`StoreFailurePolicy`] decides.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use lumen_core::config::{AuthConfig, GuardsConfig, StoreFailurePolicy};
use lumen_core::error::{AppError, ErrorKind};
use lumen_core::types::{Guard, SubjectId};

use crate::jwt::JwtDecoder;
use crate::revocation::RevocationStore;

/// Progress of a request through the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    /// Nothing has been checked yet.
    Unauthenticated,
    /// A raw credential was found on the request.
    CredentialExtracted,
    /// Signature, expiry and guard are valid.
    Verified,
    /// The revocation list was consulted (or skipped under fail-open).
    BlacklistChecked,
    /// The identity is attached to the request.
    Authorized,
}

impl fmt::Display for GuardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::CredentialExtracted => "credential_extracted",
            Self::Verified => "verified",
            Self::BlacklistChecked => "blacklist_checked",
            Self::Authorized => "authorized",
        };
        f.write_str(label)
    }
}

/// A request the guard refused.
#[derive(Debug, Clone, Error)]
#[error("rejected at {stage}: {kind}: {reason}")]
pub struct GuardRejection {
    /// The last stage the request reached.
    pub stage: GuardStage,
    /// `AuthInvalid`, `AuthRevoked` or `StoreUnavailable`.
    pub kind: ErrorKind,
    /// Internal reason, for logs only.
    pub reason: String,
}

impl GuardRejection {
    fn new(stage: GuardStage, kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            reason: reason.into(),
        }
    }
}

impl From<GuardRejection> for AppError {
    fn from(rejection: GuardRejection) -> Self {
        AppError::new(rejection.kind, rejection.reason)
    }
}

/// The authenticated caller, attached to the request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// The subject.
    pub subject_id: SubjectId,
    /// Guard the request was authorized for.
    pub guard: Guard,
    /// Credential id (`jti`).
    pub credential_id: Uuid,
    /// The raw credential as presented.
    pub raw_credential: String,
    /// Issue time of the credential.
    pub issued_at: DateTime<Utc>,
    /// Absolute expiry of the credential.
    pub expires_at: DateTime<Utc>,
    /// The revocation list could not be consulted and the guard fails open.
    pub degraded: bool,
}

/// Find the credential on a request.
///
/// The `Authorization` header wins when it carries a `Bearer` credential
/// (prefix matched case-insensitively); otherwise the `token` query
/// parameter is used.
pub fn extract_credential<'a>(
    authorization: Option<&'a str>,
    query_token: Option<&'a str>,
) -> Option<&'a str> {
    let from_header = authorization.and_then(|value| {
        let value = value.trim();
        let (scheme, rest) = value.split_once(' ')?;
        scheme.eq_ignore_ascii_case("bearer").then(|| rest.trim())
    });

    from_header
        .filter(|token| !token.is_empty())
        .or_else(|| query_token.map(str::trim).filter(|token| !token.is_empty()))
}

/// Verifies credentials for a guard and consults the revocation list.
#[derive(Debug, Clone)]
pub struct SessionGuard {
    decoder: JwtDecoder,
    revocations: RevocationStore,
    guards: GuardsConfig,
}

impl SessionGuard {
    /// Create a guard.
    pub fn new(config: &AuthConfig, decoder: JwtDecoder, revocations: RevocationStore) -> Self {
        Self {
            decoder,
            revocations,
            guards: config.guards.clone(),
        }
    }

    /// The revocation list this guard consults.
    pub fn revocations(&self) -> &RevocationStore {
        &self.revocations
    }

    /// Authorize a raw credential for `guard` at the current time.
    pub async fn authorize(
        &self,
        raw: Option<&str>,
        guard: Guard,
    ) -> Result<SessionIdentity, GuardRejection> {
        self.authorize_at(raw, guard, Utc::now()).await
    }

    /// Authorize a raw credential for `guard` as if the time were `now`.
    pub async fn authorize_at(
        &self,
        raw: Option<&str>,
        guard: Guard,
        now: DateTime<Utc>,
    ) -> Result<SessionIdentity, GuardRejection> {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Err(GuardRejection::new(
                GuardStage::Unauthenticated,
                ErrorKind::AuthInvalid,
                "credential missing",
            ));
        };

        let verified = self.decoder.verify_at(raw, guard, now).map_err(|e| {
            debug!(guard = %guard, error = %e, "Credential rejected");
            GuardRejection::new(
                GuardStage::CredentialExtracted,
                ErrorKind::AuthInvalid,
                e.to_string(),
            )
        })?;

        let degraded = match self.revocations.is_revoked(verified.credential_id).await {
            Ok(false) => false,
            Ok(true) => {
                debug!(
                    guard = %guard,
                    subject_id = %verified.subject_id,
                    credential_id = %verified.credential_id,
                    "Revoked credential presented"
                );
                return Err(GuardRejection::new(
                    GuardStage::Verified,
                    ErrorKind::AuthRevoked,
                    "credential revoked",
                ));
            }
            Err(e) => match self.guards.get(guard).store_failure {
                StoreFailurePolicy::FailClosed => {
                    warn!(guard = %guard, error = %e, "Revocation store unavailable, failing closed");
                    return Err(GuardRejection::new(
                        GuardStage::Verified,
                        ErrorKind::StoreUnavailable,
                        e.to_string(),
                    ));
                }
                StoreFailurePolicy::FailOpen => {
                    warn!(
                        guard = %guard,
                        subject_id = %verified.subject_id,
                        error = %e,
                        "Revocation store unavailable, failing open"
                    );
                    true
                }
            },
        };

        Ok(SessionIdentity {
            subject_id: verified.subject_id,
            guard,
            credential_id: verified.credential_id,
            raw_credential: raw.to_string(),
            issued_at: verified.issued_at,
            expires_at: verified.expires_at,
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeDelta;
    use lumen_cache::memory::MemoryStore;
    use lumen_cache::testing::ChaosStore;
    use lumen_core::traits::CacheProvider;

    use super::*;
    use crate::jwt::JwtEncoder;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "guard-test-secret".to_string(),
            ..AuthConfig::default()
        }
    }

    fn guard_on(store: Arc<dyn CacheProvider>) -> (JwtEncoder, SessionGuard) {
        let cfg = config();
        let revocations = RevocationStore::new(store, &cfg.revocation);
        (
            JwtEncoder::new(&cfg),
            SessionGuard::new(&cfg, JwtDecoder::new(&cfg), revocations),
        )
    }

    #[test]
    fn test_extract_credential() {
        assert_eq!(extract_credential(Some("Bearer abc"), None), Some("abc"));
        assert_eq!(extract_credential(Some("bearer abc"), None), Some("abc"));
        assert_eq!(extract_credential(Some("BEARER   abc "), None), Some("abc"));
        assert_eq!(extract_credential(Some("Bearer abc"), Some("q")), Some("abc"));
        assert_eq!(extract_credential(Some("Basic abc"), Some("q")), Some("q"));
        assert_eq!(extract_credential(None, Some("q")), Some("q"));
        assert_eq!(extract_credential(Some("Bearer "), None), None);
        assert_eq!(extract_credential(None, Some("")), None);
        assert_eq!(extract_credential(None, None), None);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let (_, guard) = guard_on(Arc::new(MemoryStore::new()));
        let rejection = guard.authorize(None, Guard::Api).await.unwrap_err();
        assert_eq!(rejection.stage, GuardStage::Unauthenticated);
        assert_eq!(rejection.kind, ErrorKind::AuthInvalid);
    }

    #[tokio::test]
    async fn test_guard_mismatch_is_auth_invalid() {
        let (encoder, guard) = guard_on(Arc::new(MemoryStore::new()));
        let issued = encoder.issue_for_guard(SubjectId(5), Guard::Api).unwrap();

        let rejection = guard
            .authorize(Some(&issued.token), Guard::Admin)
            .await
            .unwrap_err();
        assert_eq!(rejection.stage, GuardStage::CredentialExtracted);
        assert_eq!(rejection.kind, ErrorKind::AuthInvalid);

        let identity = guard
            .authorize(Some(&issued.token), Guard::Api)
            .await
            .unwrap();
        assert_eq!(identity.subject_id, SubjectId(5));
        assert_eq!(identity.raw_credential, issued.token);
        assert!(!identity.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revocation_timeline() {
        let store = MemoryStore::new();
        let (encoder, guard) = guard_on(Arc::new(store.clone()));
        let t = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        let issued = encoder
            .issue_at(SubjectId(42), Guard::Api, TimeDelta::seconds(3600), "im.web", t)
            .unwrap();

        // T+10s: revoke for the remaining 3590s.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(
            guard
                .revocations()
                .revoke_until(issued.credential_id, issued.expires_at, t + TimeDelta::seconds(10))
                .await
                .unwrap()
        );
        assert_eq!(store.len(), 1);

        // T+11s: rejected as revoked.
        tokio::time::advance(Duration::from_secs(1)).await;
        let rejection = guard
            .authorize_at(Some(&issued.token), Guard::Api, t + TimeDelta::seconds(11))
            .await
            .unwrap_err();
        assert_eq!(rejection.kind, ErrorKind::AuthRevoked);
        assert_eq!(rejection.stage, GuardStage::Verified);

        // T+3600s: the entry is gone along with the credential itself.
        tokio::time::advance(Duration::from_secs(3589)).await;
        assert!(store.is_empty());
        let rejection = guard
            .authorize_at(Some(&issued.token), Guard::Api, t + TimeDelta::seconds(3600))
            .await
            .unwrap_err();
        assert_eq!(rejection.kind, ErrorKind::AuthInvalid);
    }

    #[tokio::test]
    async fn test_store_failure_policy_per_guard() {
        let chaos = ChaosStore::default();
        let (encoder, guard) = guard_on(Arc::new(chaos.clone()));
        let admin = encoder.issue_for_guard(SubjectId(1), Guard::Admin).unwrap();
        let api = encoder.issue_for_guard(SubjectId(1), Guard::Api).unwrap();
        chaos.set_failing(true);

        let rejection = guard
            .authorize(Some(&admin.token), Guard::Admin)
            .await
            .unwrap_err();
        assert_eq!(rejection.kind, ErrorKind::StoreUnavailable);

        let identity = guard.authorize(Some(&api.token), Guard::Api).await.unwrap();
        assert!(identity.degraded);
    }
}
