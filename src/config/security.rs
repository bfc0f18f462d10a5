//! Security configuration for reputation, classification, rate limiting and sessions.

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use std::path::PathBuf;

use super::defaults::{
    default_classifier_base_url, default_classifier_keys_env,
    default_classifier_max_calls_per_second, default_classifier_model,
    default_classifier_timeout_ms, default_cookie_path, default_max_requests,
    default_remote_timeout_ms, default_reset_interval_secs, default_session_max_age_secs,
    default_true, default_window_secs,
};
use crate::security::Secret;

/// Where reputation verdicts come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReputationMode {
    /// Enrich, match and classify in this process.
    #[default]
    Local,
    /// Ask a sibling `/check-ip` service over HTTP.
    Remote,
}

/// IP reputation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReputationConfig {
    /// Local or remote assessment (default: local).
    #[serde(default)]
    pub mode: ReputationMode,
    /// Base URL of the sibling reputation service (remote mode).
    pub remote_url: Option<String>,
    /// Deadline for a remote reputation query in milliseconds (default: 200).
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    /// Newline-delimited ban pattern file (local mode).
    pub ban_list_path: Option<PathBuf>,
    /// GeoLite2 ASN database.
    pub asn_db: Option<PathBuf>,
    /// GeoLite2 City database.
    pub city_db: Option<PathBuf>,
    /// GeoLite2 Country database.
    pub country_db: Option<PathBuf>,
    /// Seconds between full resets of the allow-cache and rate table (default: 3600).
    #[serde(default = "default_reset_interval_secs")]
    pub reset_interval_secs: u64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            mode: ReputationMode::Local,
            remote_url: None,
            remote_timeout_ms: default_remote_timeout_ms(),
            ban_list_path: None,
            asn_db: None,
            city_db: None,
            country_db: None,
            reset_interval_secs: default_reset_interval_secs(),
        }
    }
}

/// Probabilistic classifier configuration.
///
/// The classifier is an OpenAI-compatible chat completion endpoint asked to
/// grade enrichment text as VPN/VPS/proxy.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Enable the classifier fallback (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API base URL; `/chat/completions` is appended.
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    /// Model identifier sent with each request.
    #[serde(default = "default_classifier_model")]
    pub model: String,
    /// Per-call deadline in milliseconds (default: 5000).
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
    /// Outbound call budget across all clients (default: 20/s).
    #[serde(default = "default_classifier_max_calls_per_second")]
    pub max_calls_per_second: u32,
    /// Credential pool. Prefer `api_keys_env` over keys in the file.
    #[serde(default)]
    pub api_keys: Vec<Secret>,
    /// Environment variable holding comma-separated keys.
    #[serde(default = "default_classifier_keys_env")]
    pub api_keys_env: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            timeout_ms: default_classifier_timeout_ms(),
            max_calls_per_second: default_classifier_max_calls_per_second(),
            api_keys: Vec::new(),
            api_keys_env: default_classifier_keys_env(),
        }
    }
}

impl ClassifierConfig {
    /// Collect the credential pool from the file and the environment.
    pub fn credential_pool(&self) -> Vec<Secret> {
        let mut keys = self.api_keys.clone();
        if let Ok(raw) = std::env::var(&self.api_keys_env) {
            keys.extend(
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(Secret::new),
            );
        }
        keys.retain(|k| !k.is_empty());
        keys
    }
}

/// Per-IP fixed window rate limit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds (default: 60).
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Requests admitted per IP per window (default: 10).
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
        }
    }
}

/// Session token configuration for the login hand-off.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for session tokens.
    /// MUST be kept private and should be at least 32 characters.
    #[serde(default = "default_session_secret")]
    pub secret: Secret,
    /// Maximum token age in seconds (default: 300).
    /// `0` disables expiry entirely and is NOT RECOMMENDED.
    #[serde(default = "default_session_max_age_secs")]
    pub max_age_secs: u64,
    /// Path attribute of the `session` cookie (default: "/player/growid").
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: default_session_secret(),
            max_age_secs: default_session_max_age_secs(),
            cookie_path: default_cookie_path(),
        }
    }
}

fn default_session_secret() -> Secret {
    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    tracing::warn!(
        "No session secret configured - using ephemeral random secret. Session tokens will NOT survive a restart. Set [session].secret in config.toml for production use."
    );
    Secret::new(secret)
}

/// A merchant allowed to open a login hand-off.
#[derive(Debug, Clone, Deserialize)]
pub struct MerchantBlock {
    /// Merchant name as sent in the `meta` field.
    pub name: String,
    /// Merchant API key.
    pub api_key: Secret,
}
