use axum::http::{header, HeaderMap};
use tracing::debug;

use super::{config::AuthConfig, error::AuthError, types::AuthenticatedUser};
use crate::security::jwt::JwtManager;

/// Token from `Authorization: <prefix><token>`, if any.
pub fn extract_bearer_from_headers<'a>(
    headers: &'a HeaderMap,
    config: &AuthConfig,
) -> Option<&'a str> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;

    let token = raw
        .strip_prefix(config.bearer_prefix.as_str())
        .or_else(|| raw.strip_prefix("bearer "))?
        .trim();

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Check if a token looks like a JWT (3 base64 parts separated by dots)
pub fn is_jwt_format(token: &str) -> bool {
    token.split('.').count() == 3
}

pub async fn authenticate_token(
    token: &str,
    jwt: &JwtManager,
) -> Result<AuthenticatedUser, AuthError> {
    if !is_jwt_format(token) {
        return Err(AuthError::InvalidToken);
    }

    let data = match jwt.validate_token(token) {
        Ok(data) => data,
        Err(e) => {
            debug!("Token rejected: {e}");
            return Err(AuthError::InvalidToken);
        }
    };
    let claims = data.claims;

    if jwt.is_revoked(&claims.jti).await {
        return Err(AuthError::RevokedToken);
    }

    let user_id = claims.user_id().map_err(|_| AuthError::InvalidToken)?;
    let mut user = AuthenticatedUser::new(user_id, claims.role).with_token(claims.jti, claims.exp);
    if let Some(email) = claims.email {
        user = user.with_email(email);
    }
    Ok(user)
}
