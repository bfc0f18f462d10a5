//! Prefix proxy and pass-through configuration.

use serde::Deserialize;

use super::defaults::{
    default_passthrough_prefixes, default_proxy_max_body_bytes, default_proxy_timeout_ms,
};

/// Proxy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Prefix-to-upstream routes, checked in order.
    #[serde(default)]
    pub routes: Vec<ProxyRoute>,
    /// Prefixes that skip reputation and rate checks.
    #[serde(default = "default_passthrough_prefixes")]
    pub passthrough: Vec<String>,
    /// Upstream deadline in milliseconds (default: 10000).
    #[serde(default = "default_proxy_timeout_ms")]
    pub timeout_ms: u64,
    /// Largest request body forwarded upstream (default: 8 MiB).
    #[serde(default = "default_proxy_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            passthrough: default_passthrough_prefixes(),
            timeout_ms: default_proxy_timeout_ms(),
            max_body_bytes: default_proxy_max_body_bytes(),
        }
    }
}

/// A single prefix route, e.g. `/growtopia` -> `https://origin.example.net`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyRoute {
    /// Path prefix, must start with `/`.
    pub prefix: String,
    /// Absolute origin URL the request path is appended to.
    pub upstream: String,
}
