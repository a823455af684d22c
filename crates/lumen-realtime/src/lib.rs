//! # lumen-realtime
//!
//! Multi-node comet layer for Lumen. Provides:
//!
//! - Per-connection handles with bounded FIFO outbound queues
//! - A presence registry mirroring local connections into the shared store,
//!   kept honest by per-process liveness leases
//! - An event bus for routed (per-process) delivery and domain broadcasts
//! - A delivery dispatcher that writes locally or routes to the owning process
//! - Domain consumers (audit, login notices, socket termination on revocation)

pub mod bridge;
pub mod connection;
pub mod dispatch;
pub mod message;
pub mod presence;
pub mod server;
pub mod session_control;

pub use bridge::EventBus;
pub use connection::{CloseReason, ConnectionHandle, ConnectionIdentity, ConnectionKey};
pub use dispatch::{DeliveryDispatcher, DeliveryReport, GroupDirectory};
pub use message::{ClientFrame, Event, EventKind, OutboundFrame, RecipientSelector};
pub use presence::{PresenceRecord, PresenceRegistry};
pub use server::{EngineStats, RealtimeEngine};
