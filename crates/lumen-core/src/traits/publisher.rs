//! Domain event publishing seam.

use async_trait::async_trait;

use crate::events::DomainEvent;
use crate::result::AppResult;

/// Publishes domain events on their broadcast topic.
///
/// Implemented by the realtime event bus; the auth layer only depends on
/// this trait so it never has to know how events travel.
#[async_trait]
pub trait DomainEventPublisher: Send + Sync + std::fmt::Debug + 'static {
    /// Publish an event. Errors are surfaced, never retried.
    async fn publish_domain(&self, event: &DomainEvent) -> AppResult<()>;
}
