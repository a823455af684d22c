//! Cluster-wide presence: which process holds which connection.

pub mod directory;
pub mod registry;

pub use directory::{PresenceDirectory, PresenceRecord};
pub use registry::PresenceRegistry;
