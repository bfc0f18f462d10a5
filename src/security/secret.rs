//! Redacted, zeroizing wrapper for key material.
//!
//! Session secrets, classifier API keys and merchant keys all pass through
//! this type so that `Debug` output and log fields never carry them.

use serde::Deserialize;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opaque secret string. Wiped from memory on drop.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw value. Never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Check if a secret is a placeholder that must not reach production.
///
/// Returns `true` for empty values, well-known placeholders and anything
/// shorter than 16 bytes.
pub fn is_weak_secret(secret: &Secret) -> bool {
    let s = secret.expose();
    s.is_empty()
        || s == "NoSecretKeyProvided"
        || s == "changeme"
        || s.contains("changeme")
        || s.contains("default")
        || s.len() < 16
}
