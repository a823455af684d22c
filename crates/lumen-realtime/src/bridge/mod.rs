//! Cross-process messaging over the shared pub/sub.

pub mod bus;

pub use bus::{EventBus, RoutedDelivery};
