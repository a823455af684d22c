//! Events, recipient selectors, and socket frames.

pub mod event;
pub mod frame;

pub use event::{Event, EventKind, RecipientSelector};
pub use frame::{ClientFrame, InboundMessage, OutboundFrame};
