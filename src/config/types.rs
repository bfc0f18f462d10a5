//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use super::defaults::default_app_name;
use super::proxy::ProxyConfig;
use super::security::{
    ClassifierConfig, MerchantBlock, RateLimitConfig, ReputationConfig, SessionConfig,
};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Public listener and branding.
    pub server: ServerConfig,
    /// Optional internal listener for `/check-ip` and `/metrics`.
    pub api: Option<ApiConfig>,
    /// IP reputation (ban list, geo databases, sibling service).
    #[serde(default)]
    pub reputation: ReputationConfig,
    /// Probabilistic classifier used when the ban list is inconclusive.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Per-IP request quota.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Session token settings for the login hand-off.
    #[serde(default)]
    pub session: SessionConfig,
    /// Prefix proxy and pass-through tables.
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Merchants allowed to start a login hand-off.
    #[serde(default)]
    pub merchant: Vec<MerchantBlock>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// Public listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000").
    pub address: SocketAddr,
    /// Display name used in hand-off failure messages.
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Internal API listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (e.g., "127.0.0.1:8080").
    pub address: SocketAddr,
}
