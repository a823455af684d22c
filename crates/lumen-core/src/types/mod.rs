//! Core type definitions used across the Lumen workspace.

pub mod guard;
pub mod id;

pub use guard::Guard;
pub use id::{ClientInstanceId, ProcessId, SubjectId};
