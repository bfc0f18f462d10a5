//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_app_name() -> String {
    "GTPS Gateway".to_string()
}

// =============================================================================
// Reputation Defaults
// =============================================================================

/// Deadline for the sibling `/check-ip` service, in milliseconds.
pub fn default_remote_timeout_ms() -> u64 {
    200
}

/// Allow-cache and rate table reset period (1 hour).
pub fn default_reset_interval_secs() -> u64 {
    3600
}

// =============================================================================
// Classifier Defaults
// =============================================================================

pub fn default_classifier_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

pub fn default_classifier_model() -> String {
    "openai/gpt-oss-20b:free".to_string()
}

pub fn default_classifier_timeout_ms() -> u64 {
    5000
}

pub fn default_classifier_max_calls_per_second() -> u32 {
    20
}

pub fn default_classifier_keys_env() -> String {
    "LOGINURL_CLASSIFIER_KEYS".to_string()
}

// =============================================================================
// Rate Limit Defaults
// =============================================================================

pub fn default_window_secs() -> u64 {
    60
}

pub fn default_max_requests() -> u32 {
    10
}

// =============================================================================
// Session Defaults
// =============================================================================

pub fn default_session_max_age_secs() -> u64 {
    300 // 5 minutes
}

pub fn default_cookie_path() -> String {
    "/player/growid".to_string()
}

// =============================================================================
// Proxy Defaults
// =============================================================================

pub fn default_passthrough_prefixes() -> Vec<String> {
    vec![
        "/api".to_string(),
        "/_next/static".to_string(),
        "/_next/image".to_string(),
        "/favicon.ico".to_string(),
    ]
}

pub fn default_proxy_timeout_ms() -> u64 {
    10_000
}

pub fn default_proxy_max_body_bytes() -> usize {
    8 * 1024 * 1024
}
