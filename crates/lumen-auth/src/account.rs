//! Account verification used by the login flow.
//!
//! The account database is not part of this layer. Login delegates to an
//! [`AccountVerifier`]; [`StaticAccounts`] serves the accounts listed in
//! configuration, which is enough for single-tenant deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use lumen_core::config::AccountConfig;
use lumen_core::result::AppResult;
use lumen_core::types::{Guard, SubjectId};

use crate::password::PasswordHasher;

/// An account whose password checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedAccount {
    /// The subject the account logs in as.
    pub subject_id: SubjectId,
}

/// Checks login credentials.
#[async_trait]
pub trait AccountVerifier: Send + Sync + std::fmt::Debug + 'static {
    /// Returns the account when `username`/`password` are valid for `guard`,
    /// `None` otherwise.
    async fn verify(
        &self,
        username: &str,
        password: &str,
        guard: Guard,
    ) -> AppResult<Option<VerifiedAccount>>;
}

/// Accounts from `auth.accounts`.
#[derive(Debug, Clone, Default)]
pub struct StaticAccounts {
    accounts: HashMap<String, AccountConfig>,
    hasher: PasswordHasher,
}

impl StaticAccounts {
    /// Build the directory from configuration.
    pub fn from_config(accounts: &[AccountConfig]) -> Self {
        Self {
            accounts: accounts
                .iter()
                .map(|a| (a.username.clone(), a.clone()))
                .collect(),
            hasher: PasswordHasher::new(),
        }
    }

    /// Number of configured accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no accounts are configured.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountVerifier for StaticAccounts {
    async fn verify(
        &self,
        username: &str,
        password: &str,
        guard: Guard,
    ) -> AppResult<Option<VerifiedAccount>> {
        let Some(account) = self.accounts.get(username) else {
            debug!(username = %username, "Unknown account");
            return Ok(None);
        };
        if !account.guards.contains(&guard) {
            debug!(username = %username, guard = %guard, "Account not enabled for guard");
            return Ok(None);
        }
        if !self.hasher.verify_password(password, &account.password_hash)? {
            return Ok(None);
        }
        Ok(Some(VerifiedAccount {
            subject_id: account.subject_id,
        }))
    }
}
