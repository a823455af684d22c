//! # lumen-core
//!
//! Core crate for the Lumen comet layer. Contains the shared-store traits,
//! configuration schemas, typed identifiers, session domain events,
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other Lumen crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
