//! Event delivery to local sockets and owning processes.

pub mod dispatcher;
pub mod group;

pub use dispatcher::{DeliveryDispatcher, DeliveryReport};
pub use group::{GroupDirectory, StaticGroups};
