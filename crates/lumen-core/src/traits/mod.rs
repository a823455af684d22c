//! Core traits defined in `lumen-core` and implemented by other crates.

pub mod cache;
pub mod publisher;
pub mod pubsub;

pub use cache::CacheProvider;
pub use publisher::DomainEventPublisher;
pub use pubsub::{PubSubMessage, PubSubProvider};
