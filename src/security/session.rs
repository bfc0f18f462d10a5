//! Signed session tokens for the login hand-off.
//!
//! A token is `base64url(timestamp) "." base64url(HMAC-SHA256(secret, timestamp))`
//! where `timestamp` is the decimal Unix time in seconds at issue. Nothing is
//! stored server-side: a token's lifetime is bounded only by the `max_age`
//! checked at validation time, and there is no revocation.
//!
//! # Security Model
//!
//! - Signature comparison is constant time (`subtle`), so a forger cannot
//!   learn how many leading bytes of a guess were right.
//! - Validation answers only `true`/`false`. The failure reason is logged at
//!   debug level and never returned, so callers cannot act as an oracle.
//! - `max_age_secs = 0` disables expiry. That makes every token ever issued
//!   under the secret valid forever; it exists for parity with older
//!   deployments and must not be the default.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::TokenError;
use crate::security::Secret;

type HmacSha256 = Hmac<Sha256>;

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Issue a token stamped with the current time.
pub fn issue(secret: &Secret) -> String {
    issue_at(secret, unix_now())
}

/// Issue a token stamped with `timestamp`.
pub fn issue_at(secret: &Secret, timestamp: i64) -> String {
    let ts = timestamp.to_string();
    let signature = sign(secret, ts.as_bytes());
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(ts.as_bytes()),
        URL_SAFE_NO_PAD.encode(signature)
    )
}

/// Validate a token against the current time.
///
/// `max_age_secs = 0` disables the age check.
pub fn validate(token: &str, secret: &Secret, max_age_secs: u64) -> bool {
    validate_at(token, secret, max_age_secs, unix_now())
}

/// Validate a token as if the current time were `now`.
pub fn validate_at(token: &str, secret: &Secret, max_age_secs: u64, now: i64) -> bool {
    match check(token, secret, max_age_secs, now) {
        Ok(()) => true,
        Err(e) => {
            debug!(reason = e.error_code(), "session token rejected");
            false
        }
    }
}

fn check(token: &str, secret: &Secret, max_age_secs: u64, now: i64) -> Result<(), TokenError> {
    let mut parts = token.split('.');
    let (Some(ts_part), Some(sig_part), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TokenError::Malformed);
    };

    let ts_bytes = decode_part(ts_part)?;
    let timestamp: i64 = std::str::from_utf8(&ts_bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(TokenError::Malformed)?;

    if max_age_secs > 0 && now.abs_diff(timestamp) > max_age_secs {
        return Err(TokenError::Expired);
    }

    let supplied = decode_part(sig_part)?;
    let expected = sign(secret, &ts_bytes);

    // ct_eq on slices of different length is a constant-time `false`.
    if bool::from(expected.as_slice().ct_eq(supplied.as_slice())) {
        Ok(())
    } else {
        Err(TokenError::SignatureMismatch)
    }
}

/// Decode one token part. Padded input is accepted for compatibility.
fn decode_part(part: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(part.trim_end_matches('='))
        .map_err(|_| TokenError::Malformed)
}

fn sign(secret: &Secret, message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}
