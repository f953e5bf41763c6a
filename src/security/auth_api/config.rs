use crate::core::urls::ApiUrls;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub bearer_prefix: String,
    /// Matched exactly or as a `/`-separated prefix.
    pub allow_anonymous_paths: Vec<String>,
    /// Matched exactly only.
    pub anonymous_exact_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bearer_prefix: "Bearer ".to_string(),
            allow_anonymous_paths: vec![
                ApiUrls::HEALTH.to_string(),
                ApiUrls::API_HEALTH.to_string(),
                ApiUrls::AUTH_SIGNUP.to_string(),
                ApiUrls::AUTH_LOGIN.to_string(),
            ],
            anonymous_exact_paths: vec![ApiUrls::EVENTS.to_string()],
        }
    }
}

impl AuthConfig {
    pub fn is_anonymous_allowed(&self, path: &str) -> bool {
        if self.anonymous_exact_paths.iter().any(|p| p == path) {
            return true;
        }
        self.allow_anonymous_paths
            .iter()
            .any(|allowed| path == allowed || path.starts_with(&format!("{allowed}/")))
    }
}
