//! Store manager that builds the configured providers.

use std::sync::Arc;

use tracing::info;

use lumen_core::config::StoreConfig;
use lumen_core::error::AppError;
use lumen_core::result::AppResult;
use lumen_core::traits::{CacheProvider, PubSubProvider};

/// The shared store and pub/sub pair every process works against.
#[derive(Debug, Clone)]
pub struct StoreManager {
    /// Key/value and hash store.
    pub store: Arc<dyn CacheProvider>,
    /// Topic messaging.
    pub pubsub: Arc<dyn PubSubProvider>,
}

impl StoreManager {
    /// Connect to the provider named in configuration.
    pub async fn connect(config: &StoreConfig) -> AppResult<Self> {
        match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis store provider");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Ok(Self {
                    store: Arc::new(crate::redis::RedisStore::new(client.clone())),
                    pubsub: Arc::new(crate::redis::RedisPubSub::new(client)),
                })
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory store provider");
                Ok(Self {
                    store: Arc::new(crate::memory::MemoryStore::new()),
                    pubsub: Arc::new(crate::memory::MemoryPubSub::new(config.pubsub_buffer)),
                })
            }
            other => Err(AppError::configuration(format!(
                "Unknown store provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// Build a manager from existing providers (for testing).
    pub fn from_providers(
        store: Arc<dyn CacheProvider>,
        pubsub: Arc<dyn PubSubProvider>,
    ) -> Self {
        Self { store, pubsub }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::ErrorKind;

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let config = StoreConfig {
            provider: "etcd".to_string(),
            ..StoreConfig::default()
        };
        let err = StoreManager::connect(&config).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_memory_provider() {
        let manager = StoreManager::connect(&StoreConfig::default()).await.unwrap();
        assert!(manager.store.health_check().await.unwrap());
    }
}
