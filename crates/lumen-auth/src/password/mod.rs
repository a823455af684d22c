//! Password hashing for the built-in account directory.

pub mod hasher;

pub use hasher::PasswordHasher;
