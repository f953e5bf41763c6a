//! Process configuration.
//!
//! Everything is read from the environment once at startup. `main` loads a
//! `.env` file through `dotenvy` before calling [`AppConfig::from_env`].

use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-key-change-in-production-minimum-32-chars";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be at least {min} characters")]
    TooShort { key: &'static str, min: usize },
    #[error("unknown AI_PROVIDER '{0}', expected 'gemini' or 'openai'")]
    UnknownProvider(String),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtSettings,
    pub ai: AiConfig,
    pub email: Option<EmailConfig>,
    pub events: EventsConfig,
    pub logging: LogConfig,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub expiry_minutes: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiProviderKind {
    Gemini,
    OpenAi,
}

impl FromStr for AiProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AiConfig {
    pub provider: AiProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub starttls: bool,
}

#[derive(Clone, Debug)]
pub struct EventsConfig {
    pub signing_key: Option<String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub queue_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", get("PORT"), 3000)?,
        };

        let database = DatabaseConfig {
            url: get("DATABASE_URL"),
            pool_size: parse_or("DB_POOL_SIZE", get("DB_POOL_SIZE"), 10)?,
        };

        let secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set, using default development secret - DO NOT USE IN PRODUCTION");
                DEV_JWT_SECRET.to_string()
            }
        };
        if secret.len() < 32 {
            return Err(ConfigError::TooShort {
                key: "JWT_SECRET",
                min: 32,
            });
        }
        let jwt = JwtSettings {
            secret,
            expiry_minutes: parse_or("JWT_EXPIRY_MINUTES", get("JWT_EXPIRY_MINUTES"), 1440)?,
        };

        let provider = match get("AI_PROVIDER") {
            Some(p) => p.parse()?,
            None => AiProviderKind::Gemini,
        };
        let timeout_seconds = parse_or("AI_TIMEOUT_SECONDS", get("AI_TIMEOUT_SECONDS"), 30)?;
        let ai = match provider {
            AiProviderKind::Gemini => AiConfig {
                provider,
                api_key: get("GEMINI_API_KEY"),
                model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-1.5-flash-8b".to_string()),
                base_url: get("GEMINI_BASE_URL")
                    .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
                timeout_seconds,
            },
            AiProviderKind::OpenAi => AiConfig {
                provider,
                api_key: get("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
                timeout_seconds,
            },
        };

        let email = match get("SMTP_HOST") {
            Some(smtp_host) => Some(EmailConfig {
                smtp_host,
                smtp_port: parse_or("SMTP_PORT", get("SMTP_PORT"), 587)?,
                username: get("SMTP_USER"),
                password: get("SMTP_PASS"),
                from: get("SMTP_FROM").unwrap_or_else(|| "noreply@ticketserver.local".to_string()),
                starttls: parse_bool("SMTP_STARTTLS", get("SMTP_STARTTLS"), true)?,
            }),
            None => None,
        };

        let events = EventsConfig {
            signing_key: get("EVENT_SIGNING_KEY"),
            max_retries: parse_or("JOB_MAX_RETRIES", get("JOB_MAX_RETRIES"), 2)?,
            retry_delay_ms: parse_or("JOB_RETRY_DELAY_MS", get("JOB_RETRY_DELAY_MS"), 1000)?,
            queue_capacity: parse_or("EVENT_QUEUE_CAPACITY", get("EVENT_QUEUE_CAPACITY"), 256)?,
        };

        let logging = LogConfig {
            level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            dir: get("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server,
            database,
            jwt,
            ai,
            email,
            events,
            logging,
            cors_allowed_origins,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes" | "on") => Ok(true),
        Some("false" | "0" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::InvalidValue {
            key,
            value: raw.unwrap_or_default(),
        }),
    }
}
