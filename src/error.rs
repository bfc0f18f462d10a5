//! Unified error handling for the gateway.
//!
//! Adapter-layer errors never reach the dispatcher: reputation failures are
//! turned into fail-open verdicts and proxy failures into a fixed 502. Each
//! enum carries an `error_code()` for metric labels.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Ban list errors
// ============================================================================

/// The ban pattern file could not be loaded.
#[derive(Debug, Error)]
pub enum BanListError {
    #[error("failed to read ban list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Geo database errors
// ============================================================================

/// A configured geo/ASN database could not be opened.
#[derive(Debug, Error)]
#[error("failed to open {kind} database {path}: {message}")]
pub struct GeoError {
    pub kind: &'static str,
    pub path: PathBuf,
    pub message: String,
}

// ============================================================================
// Classifier errors
// ============================================================================

/// Reasons a classification attempt produced no verdict.
///
/// All of these are `ClassifierUnavailable` to the reputation service, which
/// fails open.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier disabled")]
    Disabled,

    #[error("credential pool is empty")]
    NoCredentials,

    #[error("outbound classifier budget exhausted")]
    Throttled,

    #[error("classifier call timed out")]
    Timeout,

    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("classifier returned HTTP {0}")]
    Status(u16),

    #[error("classifier reply had no message content")]
    EmptyReply,

    #[error("classifier reply was not a verdict object: {0}")]
    Parse(String),
}

impl ClassifierError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::NoCredentials => "no_credentials",
            Self::Throttled => "throttled",
            Self::Timeout => "timeout",
            Self::Request(_) => "request",
            Self::Status(_) => "status",
            Self::EmptyReply => "empty_reply",
            Self::Parse(_) => "parse",
        }
    }
}

// ============================================================================
// Proxy errors
// ============================================================================

/// Forwarding to an upstream origin failed.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream timed out")]
    Timeout,

    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("request body exceeds the configured limit")]
    TooLarge,

    #[error("request body unreadable: {0}")]
    Body(String),

    #[error("invalid upstream url: {0}")]
    Url(String),
}

impl ProxyError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Request(_) => "request",
            Self::TooLarge => "too_large",
            Self::Body(_) => "body",
            Self::Url(_) => "url",
        }
    }
}

// ============================================================================
// Session token errors (internal only)
// ============================================================================

/// Why a session token failed validation.
///
/// Only ever logged. Validation returns a plain `bool` so the distinction
/// never reaches a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token malformed")]
    Malformed,

    #[error("token expired")]
    Expired,

    #[error("token signature mismatch")]
    SignatureMismatch,
}

impl TokenError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::SignatureMismatch => "signature_mismatch",
        }
    }
}

// ============================================================================
// Startup errors
// ============================================================================

/// A component could not be built from configuration.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    BanList(#[from] BanListError),

    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error("reputation.ban_list_path is not set")]
    NoBanList,

    #[error("invalid reputation.remote_url: {0}")]
    RemoteUrl(String),

    #[error("failed to build proxy HTTP client: {0}")]
    ProxyClient(#[from] reqwest::Error),
}
