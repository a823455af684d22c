//! # lumen-cache
//!
//! Shared store implementations for Lumen. Supports two modes:
//!
//! - **memory**: in-process store and pub/sub for a single node and tests
//! - **redis**: Redis-backed store and pub/sub using the
//!   [redis](https://crates.io/crates/redis) crate, shared by every process
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;
#[cfg(feature = "test-util")]
pub mod testing;

pub use provider::StoreManager;
