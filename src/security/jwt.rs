use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::shared::models::User;
use crate::security::auth_api::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    pub leeway_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "ticketserver".into(),
            audience: "ticketserver-api".into(),
            access_token_expiry_minutes: 1440,
            leeway_seconds: 60,
        }
    }
}

impl JwtConfig {
    pub fn with_expiry_minutes(mut self, minutes: i64) -> Self {
        self.access_token_expiry_minutes = minutes.max(1);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Claims {
    pub fn new(user_id: Uuid, issuer: &str, audience: &str, role: Role, expiry: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            role,
            email: None,
        }
    }

    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow!("Invalid user ID in claims: {e}"))
    }
}

/// Issues and verifies HS256 session tokens.
///
/// Revoked token ids are kept in memory until the token would have expired
/// anyway; [`JwtManager::cleanup_blacklist`] drops the stale entries.
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    blacklist: Arc<RwLock<HashMap<String, i64>>>,
}

impl JwtManager {
    pub fn new(config: JwtConfig, secret: &str) -> Result<Self> {
        if secret.len() < 32 {
            return Err(anyhow!("JWT secret must be at least 32 characters"));
        }
        Ok(Self {
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            blacklist: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn from_secret(secret: &str) -> Result<Self> {
        Self::new(JwtConfig::default(), secret)
    }

    pub fn generate_token(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode access token: {e}"))
    }

    /// Token carrying the user's id, role and email.
    pub fn issue_for_user(&self, user: &User) -> Result<String> {
        let expiry = Utc::now() + Duration::minutes(self.config.access_token_expiry_minutes);
        let claims = Claims::new(user.id, &self.config.issuer, &self.config.audience, user.role, expiry)
            .with_email(user.email.clone());
        self.generate_token(&claims)
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = self.config.leeway_seconds;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow!("Token validation failed: {e}"))
    }

    pub async fn validate_token_with_blacklist(&self, token: &str) -> Result<TokenData<Claims>> {
        let token_data = self.validate_token(token)?;

        let blacklist = self.blacklist.read().await;
        if blacklist.contains_key(&token_data.claims.jti) {
            return Err(anyhow!("Token has been revoked"));
        }

        Ok(token_data)
    }

    pub async fn revoke(&self, claims: &Claims) {
        let mut blacklist = self.blacklist.write().await;
        blacklist.insert(claims.jti.clone(), claims.exp);
        debug!("Revoked token {}", claims.jti);
    }

    pub async fn revoke_by_token(&self, token: &str) -> Result<()> {
        let token_data = self.validate_token(token)?;
        self.revoke(&token_data.claims).await;
        Ok(())
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.blacklist.read().await.contains_key(jti)
    }

    /// Forgets revoked ids whose token expired before `expired_before`.
    pub async fn cleanup_blacklist(&self, expired_before: DateTime<Utc>) -> usize {
        let cutoff = expired_before.timestamp();
        let mut blacklist = self.blacklist.write().await;
        let initial_count = blacklist.len();
        blacklist.retain(|_, exp| *exp >= cutoff);
        let removed = initial_count - blacklist.len();
        if removed > 0 {
            info!("Cleaned up {removed} entries from token blacklist");
        }
        removed
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_manager() -> JwtManager {
        JwtManager::from_secret("this-is-a-very-long-secret-key-for-testing-purposes-only")
            .expect("Failed to create manager")
    }

    fn test_user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            password_hash: String::new(),
            role,
            skills: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtManager::from_secret("short").is_err());
    }

    #[test]
    fn test_issue_and_validate() {
        let manager = create_test_manager();
        let user = test_user(Role::Moderator);

        let token = manager.issue_for_user(&user).expect("Failed to generate");
        let claims = manager.validate_token(&token).expect("Validation failed").claims;

        assert_eq!(claims.user_id().expect("Invalid user ID"), user.id);
        assert_eq!(claims.role, Role::Moderator);
        assert_eq!(claims.email.as_deref(), Some("test@example.com"));
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_invalid_token() {
        let manager = create_test_manager();
        assert!(manager.validate_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let manager = create_test_manager();
        let other = JwtManager::from_secret("another-very-long-secret-key-used-by-someone-else")
            .expect("Failed to create manager");
        let token = other.issue_for_user(&test_user(Role::Admin)).expect("generate");
        assert!(manager.validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = create_test_manager();
        let config = manager.config();
        let claims = Claims::new(
            Uuid::new_v4(),
            &config.issuer,
            &config.audience,
            Role::User,
            Utc::now() - Duration::hours(2),
        );
        let token = manager.generate_token(&claims).expect("generate");
        assert!(manager.validate_token(&token).is_err());
    }

    #[tokio::test]
    async fn test_token_revocation() {
        let manager = create_test_manager();
        let token = manager.issue_for_user(&test_user(Role::User)).expect("generate");

        assert!(manager.validate_token_with_blacklist(&token).await.is_ok());
        manager.revoke_by_token(&token).await.expect("Revoke failed");

        let result = manager.validate_token_with_blacklist(&token).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_blacklist_keeps_live_entries() {
        let manager = create_test_manager();
        let config = manager.config().clone();
        let live = Claims::new(Uuid::new_v4(), &config.issuer, &config.audience, Role::User, Utc::now() + Duration::hours(1));
        let stale = Claims::new(Uuid::new_v4(), &config.issuer, &config.audience, Role::User, Utc::now() - Duration::hours(1));
        manager.revoke(&live).await;
        manager.revoke(&stale).await;

        assert_eq!(manager.cleanup_blacklist(Utc::now()).await, 1);
        assert!(manager.is_revoked(&live.jti).await);
        assert!(!manager.is_revoked(&stale.jti).await);
    }
}
