use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<Method>,
    pub allowed_headers: Vec<header::HeaderName>,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec![Method::GET, Method::POST, Method::OPTIONS],
            allowed_headers: vec![
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                header::HeaderName::from_static("x-event-signature"),
                header::HeaderName::from_static("x-event-timestamp"),
            ],
            max_age_secs: 3600,
        }
    }
}

impl CorsConfig {
    pub fn with_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// With no configured origins any well-formed http(s) origin is accepted.
    pub fn build(self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        let allow_origin = if origins.is_empty() {
            AllowOrigin::predicate(|origin: &HeaderValue, _: &axum::http::request::Parts| {
                origin.to_str().map(is_valid_origin_format).unwrap_or(false)
            })
        } else {
            info!("CORS configured with {} allowed origins", origins.len());
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(self.allowed_methods)
            .allow_headers(self.allowed_headers)
            .max_age(std::time::Duration::from_secs(self.max_age_secs))
    }
}

pub fn create_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    CorsConfig::default()
        .with_origins(allowed_origins.to_vec())
        .build()
}

fn is_valid_origin_format(origin: &str) -> bool {
    let Some(rest) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };

    if rest.is_empty() || rest.contains("..") || rest.contains('/') {
        return false;
    }

    let origin_lower = origin.to_lowercase();
    !["<script", "javascript:", "data:", "%3c", "%3e", "\\x", "\\u"]
        .iter()
        .any(|p| origin_lower.contains(p))
}
