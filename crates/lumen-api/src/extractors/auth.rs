//! `AuthSession` extractor: the identity the guard middleware attached.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use lumen_auth::SessionIdentity;
use lumen_core::error::AppError;

use crate::error::ApiError;

/// Authenticated session available in handlers behind a guard.
#[derive(Debug, Clone)]
pub struct AuthSession(pub SessionIdentity);

impl std::ops::Deref for AuthSession {
    type Target = SessionIdentity;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionIdentity>()
            .cloned()
            .map(AuthSession)
            .ok_or_else(|| ApiError(AppError::auth_invalid("route is not behind a guard")))
    }
}
