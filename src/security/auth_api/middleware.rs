use super::{
    config::AuthConfig,
    error::AuthError,
    types::{AuthenticatedUser, Permission},
    utils::{authenticate_token, extract_bearer_from_headers},
};
use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use crate::security::jwt::JwtManager;

#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub config: Arc<AuthConfig>,
    pub jwt: Arc<JwtManager>,
}

impl AuthMiddlewareState {
    pub fn new(config: Arc<AuthConfig>, jwt: Arc<JwtManager>) -> Self {
        Self { config, jwt }
    }
}

/// Attaches an [`AuthenticatedUser`] to every request.
///
/// Anonymous paths get the anonymous user; everything else needs a valid,
/// unrevoked bearer token.
pub async fn auth_middleware(
    mut request: Request<Body>,
    next: Next,
    state: AuthMiddlewareState,
) -> Response {
    let path = request.uri().path().to_string();

    if state.config.is_anonymous_allowed(&path) {
        request
            .extensions_mut()
            .insert(AuthenticatedUser::anonymous());
        return next.run(request).await;
    }

    // Owned so no borrow of the request is held across the await below.
    let token = extract_bearer_from_headers(request.headers(), &state.config).map(str::to_string);
    let result = match token {
        Some(token) => authenticate_token(&token, &state.jwt).await,
        None => Err(AuthError::MissingToken),
    };

    match result {
        Ok(user) => {
            debug!("Authenticated user={} role={}", user.user_id, user.role);
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            debug!("Rejected {} {}: {:?}", request.method(), path, e);
            e.into_response()
        }
    }
}

fn current_user(request: &Request<Body>) -> AuthenticatedUser {
    request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .unwrap_or_else(AuthenticatedUser::anonymous)
}

pub async fn require_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if !current_user(&request).is_authenticated() {
        return Err(AuthError::MissingToken);
    }
    Ok(next.run(request).await)
}

pub async fn require_permission_middleware(
    permission: Permission,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let user = current_user(&request);
    if !user.is_authenticated() {
        return Err(AuthError::MissingToken);
    }
    if !user.has_permission(&permission) {
        return Err(AuthError::InsufficientPermissions);
    }
    Ok(next.run(request).await)
}

pub async fn admin_only_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let user = current_user(&request);
    if !user.is_authenticated() {
        return Err(AuthError::MissingToken);
    }
    if !user.is_admin() {
        return Err(AuthError::InsufficientPermissions);
    }
    Ok(next.run(request).await)
}
