//! Account routes under `/api/auth`.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::ApiError;
use crate::core::shared::models::{
    normalize_email, normalize_skills, NewUser, User, UserChanges, MAX_EMAIL_LEN,
};
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::events::USER_SIGNUP;
use crate::security::auth_api::{
    admin_only_middleware, extract_bearer_from_headers, AuthenticatedUser, Role,
};
use crate::store::UserStore;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub email: String,
    pub role: Option<String>,
    pub skills: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

async fn hash_password(state: &AppState, password: String) -> Result<String, ApiError> {
    let passwords = state.passwords.clone();
    tokio::task::spawn_blocking(move || passwords.hash(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn verify_password(state: &AppState, password: String, hash: String) -> Result<bool, ApiError> {
    let passwords = state.passwords.clone();
    tokio::task::spawn_blocking(move || passwords.verify(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn issue_token(state: &AppState, user: &User) -> Result<String, ApiError> {
    state
        .jwt
        .issue_for_user(user)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("A valid email is required".into()));
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(ApiError::BadRequest(format!(
            "Email must be at most {MAX_EMAIL_LEN} characters"
        )));
    }
    let issues = state.passwords.validate(&req.password, Some(&email));
    if !issues.is_empty() {
        let message = issues.iter().map(|i| i.message()).collect::<Vec<_>>().join("; ");
        return Err(ApiError::BadRequest(message));
    }

    let password_hash = hash_password(&state, req.password).await?;
    let user = state
        .store
        .insert_user(NewUser {
            email,
            password_hash,
            role: Role::User,
            skills: normalize_skills(req.skills),
        })
        .await?;
    info!("User signed up: {} ({})", user.email, user.id);

    if let Err(e) = state.events.send(USER_SIGNUP, json!({ "email": user.email })).await {
        warn!("Failed to emit {USER_SIGNUP} for {}: {e}", user.email);
    }

    let token = issue_token(&state, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    }
    let user = state
        .store
        .find_user_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    if !verify_password(&state, req.password, user.password_hash.clone()).await? {
        warn!("Failed login for {}", user.email);
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    let token = issue_token(&state, &user)?;
    info!("User logged in: {}", user.email);
    Ok(Json(AuthResponse { user, token }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = extract_bearer_from_headers(&headers, &state.auth_config)
        .ok_or_else(|| ApiError::Unauthorized("Access Denied. No token found.".into()))?;

    state
        .jwt
        .revoke_by_token(token)
        .await
        .map_err(|_| ApiError::Unauthorized("Invalid token".into()))?;
    info!("User logged out: {}", user.user_id);

    Ok(Json(json!({ "message": "Logged out successfully" })))
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.store.list_users().await?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    if req.email.trim().is_empty() {
        return Err(ApiError::BadRequest("Email is required".into()));
    }

    let role = match req.role.as_deref() {
        Some(raw) => {
            let role: Role = raw.parse().map_err(ApiError::BadRequest)?;
            if !role.is_assignable() {
                return Err(ApiError::BadRequest(format!("Role '{raw}' cannot be assigned")));
            }
            Some(role)
        }
        None => None,
    };

    let changes = UserChanges {
        role,
        skills: req.skills.map(normalize_skills),
    };
    let user = state
        .store
        .update_user(&req.email, changes)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    info!("Updated user {} role={} skills={:?}", user.email, user.role, user.skills);

    Ok(Json(user))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    let admin = Router::new()
        .route(ApiUrls::AUTH_USERS, get(list_users))
        .route(ApiUrls::AUTH_UPDATE_USER, post(update_user))
        .layer(middleware::from_fn(admin_only_middleware));

    Router::new()
        .route(ApiUrls::AUTH_SIGNUP, post(signup))
        .route(ApiUrls::AUTH_LOGIN, post(login))
        .route(ApiUrls::AUTH_LOGOUT, post(logout))
        .merge(admin)
}
