//! Authentication Middleware

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::api::AppState;

use super::error::AuthError;
use super::jwt::user_id_from_token;

/// Authenticated caller injected into request extensions.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    /// User ID.
    pub id: Uuid,
}

/// Middleware to require authentication.
///
/// Extracts the Bearer token from the Authorization header, validates it and
/// injects [`AuthUser`] into request extensions. Whether the user still
/// exists is left to permission resolution, which denies unknown users.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    let id = user_id_from_token(token, &state.config.jwt_secret)?;

    request.extensions_mut().insert(AuthUser { id });

    Ok(next.run(request).await)
}

/// Extractor for the authenticated user in handlers behind [`require_auth`].
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .copied()
            .ok_or(AuthError::MissingAuthHeader)
    }
}
