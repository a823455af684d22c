//! # lumen-auth
//!
//! Guard-scoped credential handling for the Lumen comet layer.
//!
//! ## Modules
//!
//! - `jwt`: credential issuing and verification (HS256)
//! - `revocation`: shared revocation list with an optional local cache
//! - `guard`: the request guard pipeline (extract, verify, revocation check)
//! - `session`: login, logout and refresh
//! - `account`: account verification collaborator and a static implementation
//! - `password`: Argon2id password hashing

pub mod account;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod password;
pub mod revocation;
pub mod session;

pub use account::{AccountVerifier, StaticAccounts, VerifiedAccount};
pub use error::AuthError;
pub use guard::{GuardRejection, GuardStage, SessionGuard, SessionIdentity, extract_credential};
pub use jwt::{Claims, IssuedCredential, JwtDecoder, JwtEncoder, VerifiedCredential};
pub use password::PasswordHasher;
pub use revocation::RevocationStore;
pub use session::{AccessToken, LoginContext, SessionService};
