//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section; every field has a serde default so an empty file is valid.

pub mod app;
pub mod auth;
pub mod logging;
pub mod realtime;
pub mod store;

use serde::{Deserialize, Serialize};

pub use self::app::{CorsConfig, ServerConfig};
pub use self::auth::{
    AccountConfig, AuthConfig, GuardConfig, GuardsConfig, RevocationConfig, StoreFailurePolicy,
};
pub use self::logging::LoggingConfig;
pub use self::realtime::RealtimeConfig;
pub use self::store::{RedisStoreConfig, StoreConfig};

use crate::error::AppError;

/// Secret shipped in `config/default.toml`; refused outside development.
pub const PLACEHOLDER_SECRET: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Shared store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Real-time delivery settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `{dir}/default.toml` with the `{dir}/{env}.toml` overlay and
    /// environment variables prefixed with `LUMEN__` (for example
    /// `LUMEN__STORE__PROVIDER=redis`).
    pub fn load(dir: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(&format!("{dir}/default")).required(false))
            .add_source(config::File::with_name(&format!("{dir}/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("LUMEN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Reject configurations the server must not start with.
    pub fn validate(&self, env: &str) -> Result<(), AppError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(AppError::configuration("auth.jwt_secret must not be empty"));
        }
        if env != "development" && env != "test" && self.auth.jwt_secret == PLACEHOLDER_SECRET {
            return Err(AppError::configuration(format!(
                "auth.jwt_secret still holds the placeholder value in '{env}'"
            )));
        }
        for guard in crate::types::Guard::ALL {
            if self.auth.guard(guard).ttl_seconds == 0 {
                return Err(AppError::configuration(format!(
                    "auth.guards.{guard}.ttl_seconds must be positive"
                )));
            }
        }
        let intervals = [
            ("ping_interval_seconds", self.realtime.ping_interval_seconds),
            ("idle_timeout_seconds", self.realtime.idle_timeout_seconds),
            ("heartbeat_interval_seconds", self.realtime.heartbeat_interval_seconds),
        ];
        for (name, seconds) in intervals {
            if seconds == 0 {
                return Err(AppError::configuration(format!(
                    "realtime.{name} must be positive"
                )));
            }
        }
        if self.realtime.outbound_queue_capacity == 0 {
            return Err(AppError::configuration(
                "realtime.outbound_queue_capacity must be positive",
            ));
        }
        if self.realtime.lease_ttl_seconds <= self.realtime.heartbeat_interval_seconds {
            return Err(AppError::configuration(
                "realtime.lease_ttl_seconds must exceed realtime.heartbeat_interval_seconds",
            ));
        }
        match self.store.provider.as_str() {
            "memory" | "redis" => Ok(()),
            other => Err(AppError::configuration(format!(
                "Unknown store provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults_are_valid_in_development() {
        let config = AppConfig::default();
        assert!(config.validate("development").is_ok());
    }

    #[test]
    fn test_placeholder_secret_rejected_in_production() {
        let config = AppConfig::default();
        let err = config.validate("production").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_lease_must_outlive_heartbeat() {
        let mut config = AppConfig::default();
        config.realtime.lease_ttl_seconds = config.realtime.heartbeat_interval_seconds;
        assert!(config.validate("development").is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let zeroed: [fn(&mut AppConfig); 3] = [
            |c| c.realtime.ping_interval_seconds = 0,
            |c| c.realtime.idle_timeout_seconds = 0,
            |c| c.realtime.heartbeat_interval_seconds = 0,
        ];
        for zero in zeroed {
            let mut config = AppConfig::default();
            zero(&mut config);
            let err = config.validate("development").unwrap_err();
            assert_eq!(err.kind, ErrorKind::Configuration);
            assert!(err.message.contains("must be positive"), "{}", err.message);
        }
    }

    #[test]
    fn test_unknown_store_provider_rejected() {
        let mut config = AppConfig::default();
        config.store.provider = "etcd".to_string();
        assert!(config.validate("development").is_err());
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let config = AppConfig::load("does/not/exist", "test").unwrap();
        assert_eq!(config.server.port, 9504);
        assert_eq!(config.store.provider, "memory");
    }
}
