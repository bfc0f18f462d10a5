//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{Config, ReputationMode};
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("api.address must differ from server.address ({0})")]
    ListenerCollision(String),
    #[error("reputation.remote_url is required when reputation.mode = \"remote\"")]
    MissingRemoteUrl,
    #[error("reputation.ban_list_path is required in local mode and when [api] is enabled")]
    MissingBanList,
    #[error("reputation.reset_interval_secs must be greater than 0")]
    ZeroResetInterval,
    #[error("proxy route prefix must start with '/', got '{0}'")]
    InvalidProxyPrefix(String),
    #[error("proxy upstream must be an absolute http(s) URL, got '{0}'")]
    InvalidProxyUpstream(String),
    #[error("rate_limit.max_requests must be greater than 0")]
    ZeroMaxRequests,
    #[error("rate_limit.window_secs must be greater than 0")]
    ZeroWindow,
    #[error("merchant name must not be empty")]
    EmptyMerchantName,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(ref api) = config.api
        && api.address == config.server.address
    {
        errors.push(ValidationError::ListenerCollision(api.address.to_string()));
    }

    if config.reputation.mode == ReputationMode::Remote
        && config
            .reputation
            .remote_url
            .as_deref()
            .is_none_or(|u| !is_http_url(u))
    {
        errors.push(ValidationError::MissingRemoteUrl);
    }
    // The internal /check-ip endpoint always assesses locally.
    let needs_local = config.reputation.mode == ReputationMode::Local || config.api.is_some();
    if needs_local && config.reputation.ban_list_path.is_none() {
        errors.push(ValidationError::MissingBanList);
    }
    if config.reputation.reset_interval_secs == 0 {
        errors.push(ValidationError::ZeroResetInterval);
    }

    for route in &config.proxy.routes {
        if !route.prefix.starts_with('/') {
            errors.push(ValidationError::InvalidProxyPrefix(route.prefix.clone()));
        }
        if !is_http_url(&route.upstream) {
            errors.push(ValidationError::InvalidProxyUpstream(route.upstream.clone()));
        }
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::ZeroMaxRequests);
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::ZeroWindow);
    }

    if config.merchant.iter().any(|m| m.name.trim().is_empty()) {
        errors.push(ValidationError::EmptyMerchantName);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    rest.is_some_and(|host| !host.is_empty() && !host.starts_with('/'))
}
