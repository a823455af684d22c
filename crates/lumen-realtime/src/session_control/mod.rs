//! Domain event consumers run by every process.

pub mod audit;
pub mod notifier;
pub mod terminator;

use async_trait::async_trait;

use lumen_core::events::{DomainEvent, DomainTopic};

pub use audit::SessionAudit;
pub use notifier::LoginNotifier;
pub use terminator::RevocationTerminator;

/// A worker reacting to domain broadcasts.
///
/// Consumers never fail the publisher: errors are theirs to log.
#[async_trait]
pub trait DomainConsumer: Send + Sync + std::fmt::Debug + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Topics this consumer wants.
    fn topics(&self) -> &'static [DomainTopic];

    /// Handle one event.
    async fn handle(&self, event: &DomainEvent);
}
