//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, ApiConfig)
//! - [`security`]: Reputation, classifier, rate limit and session configuration
//! - [`proxy`]: Prefix proxy and pass-through tables
//! - [`validation`]: Startup checks that report every problem at once

mod defaults;
mod proxy;
mod security;
mod types;
mod validation;

pub use proxy::{ProxyConfig, ProxyRoute};
pub use security::{
    ClassifierConfig, MerchantBlock, RateLimitConfig, ReputationConfig, ReputationMode,
    SessionConfig,
};
pub use types::{ApiConfig, Config, ConfigError, ServerConfig};
pub use validation::{ValidationError, validate};
