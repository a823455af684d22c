//! Credential lifecycle: login, logout, refresh.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use lumen_core::error::AppError;
use lumen_core::events::{DomainEvent, RevocationReason, SessionEvent};
use lumen_core::result::AppResult;
use lumen_core::traits::DomainEventPublisher;
use lumen_core::types::{Guard, SubjectId};

use crate::account::AccountVerifier;
use crate::guard::SessionIdentity;
use crate::jwt::{IssuedCredential, JwtEncoder};
use crate::revocation::RevocationStore;

/// Client details recorded with a login.
#[derive(Debug, Clone, Default)]
pub struct LoginContext {
    /// Client IP address.
    pub ip_address: String,
    /// Client platform label.
    pub platform: String,
    /// Raw `User-Agent` header.
    pub user_agent: String,
}

/// Credential handed back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    /// Always `"Bearer"`.
    pub token_type: &'static str,
    /// The signed credential.
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

impl From<&IssuedCredential> for AccessToken {
    fn from(issued: &IssuedCredential) -> Self {
        Self {
            token_type: "Bearer",
            access_token: issued.token.clone(),
            expires_in: (issued.expires_at - issued.issued_at).num_seconds(),
        }
    }
}

/// Issues and revokes credentials and announces both on the domain bus.
#[derive(Debug, Clone)]
pub struct SessionService {
    encoder: JwtEncoder,
    revocations: RevocationStore,
    accounts: Arc<dyn AccountVerifier>,
    publisher: Arc<dyn DomainEventPublisher>,
}

impl SessionService {
    /// Create a session service.
    pub fn new(
        encoder: JwtEncoder,
        revocations: RevocationStore,
        accounts: Arc<dyn AccountVerifier>,
        publisher: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        Self {
            encoder,
            revocations,
            accounts,
            publisher,
        }
    }

    /// Check `username`/`password` for `guard` and issue a credential.
    ///
    /// A failed login-notice publish does not fail the login.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        guard: Guard,
        context: LoginContext,
    ) -> AppResult<AccessToken> {
        let account = self
            .accounts
            .verify(username, password, guard)
            .await?
            .ok_or_else(|| AppError::auth_invalid("invalid username or password"))?;

        let issued = self.encoder.issue_for_guard(account.subject_id, guard)?;
        info!(
            subject_id = %account.subject_id,
            guard = %guard,
            credential_id = %issued.credential_id,
            "Login succeeded"
        );

        let event = DomainEvent::new(SessionEvent::LoginOccurred {
            subject_id: account.subject_id,
            guard,
            ip_address: context.ip_address,
            platform: context.platform,
            user_agent: context.user_agent,
        });
        if let Err(e) = self.publisher.publish_domain(&event).await {
            warn!(subject_id = %account.subject_id, error = %e, "Failed to publish login event");
        }

        Ok(AccessToken::from(&issued))
    }

    /// Issue a credential without a password check.
    pub fn issue(&self, subject_id: SubjectId, guard: Guard) -> AppResult<IssuedCredential> {
        self.encoder.issue_for_guard(subject_id, guard)
    }

    /// Revoke the presented credential.
    pub async fn logout(&self, identity: &SessionIdentity) -> AppResult<()> {
        self.revoke(identity, RevocationReason::Logout).await
    }

    /// Revoke the presented credential and issue a fresh one.
    pub async fn refresh(&self, identity: &SessionIdentity) -> AppResult<AccessToken> {
        self.revoke(identity, RevocationReason::Refresh).await?;
        let issued = self
            .encoder
            .issue_for_guard(identity.subject_id, identity.guard)?;
        Ok(AccessToken::from(&issued))
    }

    /// Revoke a credential for the rest of its lifetime and tell every
    /// process to drop the sockets it authenticated.
    pub async fn revoke(
        &self,
        identity: &SessionIdentity,
        reason: RevocationReason,
    ) -> AppResult<()> {
        let written = self
            .revocations
            .revoke_until(identity.credential_id, identity.expires_at, Utc::now())
            .await?;
        if !written {
            return Ok(());
        }
        info!(
            subject_id = %identity.subject_id,
            credential_id = %identity.credential_id,
            reason = ?reason,
            "Credential revoked"
        );

        let event = DomainEvent::new(SessionEvent::CredentialRevoked {
            subject_id: identity.subject_id,
            credential_id: identity.credential_id,
            guard: identity.guard,
            reason,
        });
        if let Err(e) = self.publisher.publish_domain(&event).await {
            warn!(
                credential_id = %identity.credential_id,
                error = %e,
                "Failed to publish revocation event"
            );
        }
        Ok(())
    }
}
