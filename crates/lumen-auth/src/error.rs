//! Credential verification errors.

use thiserror::Error;

use lumen_core::error::AppError;
use lumen_core::types::Guard;

/// Why a raw credential was not accepted.
///
/// Kept distinct internally for logs and tests; every variant is reported
/// to clients as the same `AuthInvalid` response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("credential missing")]
    Missing,
    /// The credential could not be decoded.
    #[error("credential malformed")]
    Malformed,
    /// The credential is past its expiry.
    #[error("credential expired")]
    Expired,
    /// The credential was issued for another guard.
    #[error("credential issued for guard '{actual}', expected '{expected}'")]
    GuardMismatch {
        /// Guard the route requires.
        expected: Guard,
        /// Guard the credential carries.
        actual: Guard,
    },
    /// The signature does not match the shared secret.
    #[error("credential signature invalid")]
    BadSignature,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::auth_invalid(err.to_string())
    }
}
