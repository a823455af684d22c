//! Credential verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use uuid::Uuid;

use lumen_core::config::{AuthConfig, GuardsConfig};
use lumen_core::types::{Guard, SubjectId};

use super::claims::Claims;
use crate::error::AuthError;

/// What a valid credential says about its holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    /// The subject.
    pub subject_id: SubjectId,
    /// The guard the credential was issued for.
    pub guard: Guard,
    /// Credential id (`jti`).
    pub credential_id: Uuid,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
}

/// Verifies credentials against the shared secret and the wall clock.
#[derive(Clone)]
pub struct JwtDecoder {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Signature-only validation; expiry is checked by the decoder itself.
    validation: Validation,
    /// Clock skew tolerance in seconds.
    leeway_seconds: i64,
    /// Per-guard issuer each credential must carry.
    guards: GuardsConfig,
}

impl std::fmt::Debug for JwtDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDecoder")
            .field("validation", &self.validation)
            .field("leeway_seconds", &self.leeway_seconds)
            .field("guards", &self.guards)
            .finish()
    }
}

impl JwtDecoder {
    /// Creates a new decoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            leeway_seconds: config.leeway_seconds as i64,
            guards: config.guards.clone(),
        }
    }

    /// Verify `raw` for `expected` at the current time.
    pub fn verify(&self, raw: &str, expected: Guard) -> Result<VerifiedCredential, AuthError> {
        self.verify_at(raw, expected, Utc::now())
    }

    /// Verify `raw` for `expected` as if the current time were `now`.
    ///
    /// Signature first, then expiry, then the guard, then the guard's
    /// issuer.
    pub fn verify_at(
        &self,
        raw: &str,
        expected: Guard,
        now: DateTime<Utc>,
    ) -> Result<VerifiedCredential, AuthError> {
        let claims = self.decode(raw)?;

        if now.timestamp() >= claims.exp + self.leeway_seconds {
            return Err(AuthError::Expired);
        }
        if claims.guard != expected {
            return Err(AuthError::GuardMismatch {
                expected,
                actual: claims.guard,
            });
        }
        if claims.iss != self.guards.get(expected).issuer {
            return Err(AuthError::Malformed);
        }

        Ok(VerifiedCredential {
            subject_id: claims.subject_id()?,
            guard: claims.guard,
            credential_id: claims.jti,
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        })
    }

    /// Decode without expiry or guard checks.
    pub fn decode(&self, raw: &str) -> Result<Claims, AuthError> {
        let token_data = decode::<Claims>(raw, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                JwtErrorKind::InvalidSignature => AuthError::BadSignature,
                _ => AuthError::Malformed,
            })?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::jwt::encoder::JwtEncoder;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            ..AuthConfig::default()
        }
    }

    fn codec() -> (JwtEncoder, JwtDecoder) {
        let cfg = config("test-secret");
        (JwtEncoder::new(&cfg), JwtDecoder::new(&cfg))
    }

    #[test]
    fn test_verifies_for_issuing_guard_until_expiry() {
        let (encoder, decoder) = codec();
        let t = Utc::now();
        let issued = encoder
            .issue_at(SubjectId(42), Guard::Api, TimeDelta::seconds(3600), "im.web", t)
            .unwrap();

        let verified = decoder
            .verify_at(&issued.token, Guard::Api, t + TimeDelta::seconds(3599))
            .unwrap();
        assert_eq!(verified.subject_id, SubjectId(42));
        assert_eq!(verified.credential_id, issued.credential_id);
        assert_eq!(verified.expires_at, issued.expires_at);

        let err = decoder
            .verify_at(&issued.token, Guard::Api, t + TimeDelta::seconds(3600))
            .unwrap_err();
        assert_eq!(err, AuthError::Expired);
    }

    #[test]
    fn test_other_guards_are_rejected() {
        let (encoder, decoder) = codec();
        let issued = encoder
            .issue(SubjectId(7), Guard::Api, TimeDelta::seconds(60), "im.web")
            .unwrap();

        for guard in [Guard::Admin, Guard::Open] {
            let err = decoder.verify(&issued.token, guard).unwrap_err();
            assert_eq!(
                err,
                AuthError::GuardMismatch {
                    expected: guard,
                    actual: Guard::Api
                }
            );
        }
    }

    #[test]
    fn test_expiry_is_checked_before_guard() {
        let (encoder, decoder) = codec();
        let t = Utc::now() - TimeDelta::seconds(120);
        let issued = encoder
            .issue_at(SubjectId(1), Guard::Api, TimeDelta::seconds(60), "im.web", t)
            .unwrap();
        let err = decoder.verify(&issued.token, Guard::Admin).unwrap_err();
        assert_eq!(err, AuthError::Expired);
    }

    #[test]
    fn test_leeway_extends_validity() {
        let cfg = AuthConfig {
            leeway_seconds: 30,
            ..config("test-secret")
        };
        let encoder = JwtEncoder::new(&cfg);
        let decoder = JwtDecoder::new(&cfg);
        let t = Utc::now();
        let issued = encoder
            .issue_at(SubjectId(1), Guard::Open, TimeDelta::seconds(10), "im.open", t)
            .unwrap();
        assert!(
            decoder
                .verify_at(&issued.token, Guard::Open, t + TimeDelta::seconds(39))
                .is_ok()
        );
        assert_eq!(
            decoder
                .verify_at(&issued.token, Guard::Open, t + TimeDelta::seconds(40))
                .unwrap_err(),
            AuthError::Expired
        );
    }

    #[test]
    fn test_foreign_issuer_is_rejected() {
        let (encoder, decoder) = codec();
        let issued = encoder
            .issue(SubjectId(1), Guard::Api, TimeDelta::seconds(60), "im.open")
            .unwrap();
        assert_eq!(
            decoder.verify(&issued.token, Guard::Api).unwrap_err(),
            AuthError::Malformed
        );

        let issued = encoder.issue_for_guard(SubjectId(1), Guard::Api).unwrap();
        assert!(decoder.verify(&issued.token, Guard::Api).is_ok());
    }

    #[test]
    fn test_bad_signature() {
        let (encoder, _) = codec();
        let other = JwtDecoder::new(&config("another-secret"));
        let issued = encoder
            .issue(SubjectId(1), Guard::Api, TimeDelta::seconds(60), "im.web")
            .unwrap();
        assert_eq!(
            other.verify(&issued.token, Guard::Api).unwrap_err(),
            AuthError::BadSignature
        );
    }

    #[test]
    fn test_malformed() {
        let (_, decoder) = codec();
        assert_eq!(
            decoder.verify("not-a-credential", Guard::Api).unwrap_err(),
            AuthError::Malformed
        );
        assert_eq!(
            decoder.verify("", Guard::Api).unwrap_err(),
            AuthError::Malformed
        );
    }

    #[test]
    fn test_non_positive_ttl_is_refused() {
        let (encoder, _) = codec();
        assert!(
            encoder
                .issue(SubjectId(1), Guard::Api, TimeDelta::zero(), "im.web")
                .is_err()
        );
    }
}
