//! In-process store and pub/sub.

pub mod pubsub;
pub mod store;

pub use pubsub::MemoryPubSub;
pub use store::MemoryStore;
