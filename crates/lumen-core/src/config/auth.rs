//! Authentication configuration.

use serde::{Deserialize, Serialize};

use crate::types::{Guard, SubjectId};

/// What a guard does when the revocation store cannot be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Accept the credential (signature and expiry already checked) and
    /// mark the request as degraded.
    FailOpen,
    /// Reject the request with a service-unavailable error.
    FailClosed,
}

/// Authentication and credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret for credential signing (HMAC-SHA256).
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Clock skew tolerated on credential expiry, in seconds.
    #[serde(default)]
    pub leeway_seconds: u64,
    /// Per-guard settings.
    #[serde(default)]
    pub guards: GuardsConfig,
    /// Revocation lookup settings.
    #[serde(default)]
    pub revocation: RevocationConfig,
    /// Built-in account directory used by the login endpoints.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl AuthConfig {
    /// Settings for one guard.
    pub fn guard(&self, guard: Guard) -> &GuardConfig {
        self.guards.get(guard)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            leeway_seconds: 0,
            guards: GuardsConfig::default(),
            revocation: RevocationConfig::default(),
            accounts: Vec::new(),
        }
    }
}

/// Settings of every guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardsConfig {
    /// Back-office guard.
    #[serde(default = "default_admin_guard")]
    pub admin: GuardConfig,
    /// End-user API guard.
    #[serde(default = "default_api_guard")]
    pub api: GuardConfig,
    /// Open platform guard.
    #[serde(default = "default_open_guard")]
    pub open: GuardConfig,
}

impl GuardsConfig {
    /// Settings for one guard.
    pub fn get(&self, guard: Guard) -> &GuardConfig {
        match guard {
            Guard::Admin => &self.admin,
            Guard::Api => &self.api,
            Guard::Open => &self.open,
        }
    }
}

impl Default for GuardsConfig {
    fn default() -> Self {
        Self {
            admin: default_admin_guard(),
            api: default_api_guard(),
            open: default_open_guard(),
        }
    }
}

/// Settings of a single guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Lifetime of issued credentials in seconds.
    pub ttl_seconds: u64,
    /// `iss` claim written into issued credentials.
    pub issuer: String,
    /// Behaviour when the revocation store is unreachable.
    pub store_failure: StoreFailurePolicy,
}

/// Revocation lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationConfig {
    /// How long a process may keep answering from its local cache, in
    /// milliseconds. Zero disables the cache so every lookup hits the store.
    #[serde(default)]
    pub staleness_window_ms: u64,
    /// Maximum number of cached answers.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            staleness_window_ms: 0,
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// An account of the built-in directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Login name.
    pub username: String,
    /// Argon2 PHC hash of the password.
    pub password_hash: String,
    /// Subject the account authenticates as.
    pub subject_id: SubjectId,
    /// Guards the account may log in to.
    #[serde(default = "default_account_guards")]
    pub guards: Vec<Guard>,
}

fn default_jwt_secret() -> String {
    super::PLACEHOLDER_SECRET.to_string()
}

fn default_admin_guard() -> GuardConfig {
    GuardConfig {
        ttl_seconds: 12 * 3600,
        issuer: "im.admin".to_string(),
        store_failure: StoreFailurePolicy::FailClosed,
    }
}

fn default_api_guard() -> GuardConfig {
    GuardConfig {
        ttl_seconds: 3600,
        issuer: "im.web".to_string(),
        store_failure: StoreFailurePolicy::FailOpen,
    }
}

fn default_open_guard() -> GuardConfig {
    GuardConfig {
        ttl_seconds: 3600,
        issuer: "im.open".to_string(),
        store_failure: StoreFailurePolicy::FailOpen,
    }
}

fn default_cache_capacity() -> u64 {
    100_000
}

fn default_account_guards() -> Vec<Guard> {
    vec![Guard::Api]
}
