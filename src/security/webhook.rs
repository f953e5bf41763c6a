//! HMAC signatures for events posted to the ingestion endpoint.
//!
//! A signature is `v1=<hex>` where the hex digest is HMAC-SHA256 over
//! `"{unix_ts}.{body}"`. Accepted signatures are remembered for the replay
//! window so the same request cannot be delivered twice.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TIMESTAMP_TOLERANCE_SECONDS: i64 = 300;
const DEFAULT_REPLAY_WINDOW_SECONDS: i64 = 600;
pub const SIGNATURE_HEADER: &str = "X-Event-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Event-Timestamp";
const SIGNATURE_VERSION: &str = "v1";

#[derive(Debug, Clone)]
pub struct SignatureConfig {
    pub timestamp_tolerance_seconds: i64,
    pub replay_window_seconds: i64,
    pub max_payload_size: usize,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_seconds: DEFAULT_TIMESTAMP_TOLERANCE_SECONDS,
            replay_window_seconds: DEFAULT_REPLAY_WINDOW_SECONDS,
            max_payload_size: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureValidation {
    Valid,
    Missing,
    Invalid,
    Expired,
    Replayed,
}

impl SignatureValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Missing => "Signature header missing",
            Self::Invalid => "Invalid signature",
            Self::Expired => "Timestamp expired",
            Self::Replayed => "Duplicate request detected",
        }
    }
}

pub struct EventSignatureVerifier {
    config: SignatureConfig,
    seen: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl EventSignatureVerifier {
    pub fn new(config: SignatureConfig) -> Self {
        Self {
            config,
            seen: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SignatureConfig::default())
    }

    pub fn sign_payload(&self, payload: &str, secret: &str, timestamp: DateTime<Utc>) -> Result<String> {
        sign_payload(payload, secret, timestamp.timestamp())
    }

    pub async fn verify_signature(
        &self,
        payload: &str,
        signature_header: &str,
        timestamp_header: &str,
        secret: &str,
    ) -> SignatureValidation {
        if signature_header.is_empty() || timestamp_header.is_empty() {
            return SignatureValidation::Missing;
        }

        let Ok(timestamp) = timestamp_header.trim().parse::<i64>() else {
            return SignatureValidation::Invalid;
        };
        let Some(request_time) = DateTime::from_timestamp(timestamp, 0) else {
            return SignatureValidation::Invalid;
        };

        let now = Utc::now();
        let tolerance = Duration::seconds(self.config.timestamp_tolerance_seconds);
        if now - request_time > tolerance || request_time - now > tolerance {
            return SignatureValidation::Expired;
        }

        let Ok(expected_signature) = sign_payload(payload, secret, timestamp) else {
            return SignatureValidation::Invalid;
        };
        if !constant_time_compare(signature_header.trim(), &expected_signature) {
            return SignatureValidation::Invalid;
        }

        let signature_key = format!("{}:{}", signature_header.trim(), timestamp);
        let mut seen = self.seen.write().await;
        if seen.contains_key(&signature_key) {
            return SignatureValidation::Replayed;
        }
        seen.insert(signature_key, now);

        SignatureValidation::Valid
    }

    pub async fn cleanup_old_signatures(&self) -> usize {
        let cutoff = Utc::now() - Duration::seconds(self.config.replay_window_seconds);
        let mut seen = self.seen.write().await;
        let before = seen.len();
        seen.retain(|_, &mut at| at >= cutoff);
        let count = before - seen.len();
        if count > 0 {
            info!("Cleaned up {} expired event signatures", count);
        }
        count
    }

    pub fn validate_payload_size(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(anyhow!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                self.config.max_payload_size
            ));
        }
        Ok(())
    }
}

/// `v1=<hex(hmac_sha256(secret, "{timestamp}.{payload}"))>`
pub fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid signing key: {e}"))?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{SIGNATURE_VERSION}={signature}"))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{"name":"ticket/created","data":{}}"#;
    const SECRET: &str = "test_secret";

    #[test]
    fn test_signature_generation() {
        let signature = sign_payload(PAYLOAD, SECRET, 1_700_000_000).expect("sign");

        assert!(signature.starts_with("v1="));
        assert_eq!(signature.len(), 3 + 64);
        assert_eq!(signature, sign_payload(PAYLOAD, SECRET, 1_700_000_000).expect("sign"));
        assert_ne!(signature, sign_payload(PAYLOAD, SECRET, 1_700_000_001).expect("sign"));
    }

    #[tokio::test]
    async fn test_signature_verification() {
        let verifier = EventSignatureVerifier::with_defaults();
        let timestamp = Utc::now();
        let signature = verifier.sign_payload(PAYLOAD, SECRET, timestamp).expect("sign");

        let result = verifier
            .verify_signature(PAYLOAD, &signature, &timestamp.timestamp().to_string(), SECRET)
            .await;
        assert!(result.is_valid());
    }

    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let verifier = EventSignatureVerifier::with_defaults();
        let timestamp = Utc::now();
        let signature = verifier.sign_payload(PAYLOAD, SECRET, timestamp).expect("sign");

        let result = verifier
            .verify_signature("{}", &signature, &timestamp.timestamp().to_string(), SECRET)
            .await;
        assert_eq!(result, SignatureValidation::Invalid);
    }

    #[tokio::test]
    async fn test_replay_protection() {
        let verifier = EventSignatureVerifier::with_defaults();
        let timestamp = Utc::now();
        let signature = verifier.sign_payload(PAYLOAD, SECRET, timestamp).expect("sign");
        let timestamp_str = timestamp.timestamp().to_string();

        let first = verifier
            .verify_signature(PAYLOAD, &signature, &timestamp_str, SECRET)
            .await;
        assert!(first.is_valid());

        let second = verifier
            .verify_signature(PAYLOAD, &signature, &timestamp_str, SECRET)
            .await;
        assert_eq!(second, SignatureValidation::Replayed);
    }

    #[tokio::test]
    async fn test_expired_timestamp() {
        let verifier = EventSignatureVerifier::new(SignatureConfig {
            timestamp_tolerance_seconds: 60,
            ..SignatureConfig::default()
        });
        let old_timestamp = Utc::now() - Duration::seconds(120);
        let signature = verifier.sign_payload(PAYLOAD, SECRET, old_timestamp).expect("sign");

        let result = verifier
            .verify_signature(PAYLOAD, &signature, &old_timestamp.timestamp().to_string(), SECRET)
            .await;
        assert_eq!(result, SignatureValidation::Expired);
    }

    #[tokio::test]
    async fn test_missing_and_malformed_headers() {
        let verifier = EventSignatureVerifier::with_defaults();
        assert_eq!(
            verifier.verify_signature(PAYLOAD, "", "123", SECRET).await,
            SignatureValidation::Missing
        );
        assert_eq!(
            verifier.verify_signature(PAYLOAD, "v1=abc", "yesterday", SECRET).await,
            SignatureValidation::Invalid
        );
    }

    #[tokio::test]
    async fn test_signature_cleanup() {
        let verifier = EventSignatureVerifier::new(SignatureConfig {
            replay_window_seconds: -1,
            ..SignatureConfig::default()
        });
        let timestamp = Utc::now();
        let signature = verifier.sign_payload(PAYLOAD, SECRET, timestamp).expect("sign");
        verifier
            .verify_signature(PAYLOAD, &signature, &timestamp.timestamp().to_string(), SECRET)
            .await;

        assert_eq!(verifier.cleanup_old_signatures().await, 1);
    }

    #[test]
    fn test_payload_size_validation() {
        let verifier = EventSignatureVerifier::new(SignatureConfig {
            max_payload_size: 4,
            ..SignatureConfig::default()
        });
        assert!(verifier.validate_payload_size(b"1234").is_ok());
        assert!(verifier.validate_payload_size(b"12345").is_err());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
