use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use crate::{
    auth::{
        claims::Identity,
        jwt::{JwtKeys, TokenError},
    },
    error::AppError,
};

/// Session check for protected routes. Signature and expiry alone decide:
/// no database lookup, so a disabled account keeps working until its token
/// expires. A post written under a token whose user row is gone fails the
/// `author_id` foreign key and is answered with 403.
pub fn authorize(headers: &HeaderMap, keys: &JwtKeys) -> Result<Identity, AppError> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

    match keys.verify(token) {
        Ok(claims) => Ok(Identity::from(claims)),
        Err(TokenError::Expired) => {
            warn!("expired token");
            Err(AppError::Forbidden("Token expired".into()))
        }
        Err(TokenError::Invalid) => {
            warn!("invalid token");
            Err(AppError::Forbidden("Invalid token".into()))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Any holder of a valid token.
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        authorize(&parts.headers, &keys).map(AuthUser)
    }
}

/// A valid token whose role is `admin`. Required by every write endpoint.
pub struct AdminUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            warn!(user_id = %identity.user_id, role = %identity.role, "admin role required");
            return Err(AppError::Forbidden("Admin role required".into()));
        }
        Ok(AdminUser(identity))
    }
}
