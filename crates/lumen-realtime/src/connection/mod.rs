//! Client connections owned by this process.

pub mod handle;
pub mod pool;
pub mod writer;

pub use handle::{
    CloseReason, ConnectionHandle, ConnectionId, ConnectionIdentity, ConnectionKey, EnqueueOutcome,
};
pub use pool::ConnectionPool;
pub use writer::{WriterConfig, pump_outbound};
