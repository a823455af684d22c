//! Redis-backed store and pub/sub.

pub mod client;
pub mod pubsub;
pub mod store;

pub use client::RedisClient;
pub use pubsub::RedisPubSub;
pub use store::RedisStore;
