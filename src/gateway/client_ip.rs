//! Client key extraction from trusted proxy headers.
//!
//! The gateway runs behind a reverse proxy that sets `x-real-ip` and/or
//! `x-forwarded-for`. Requests carrying neither share the [`UNKNOWN_CLIENT`]
//! key, so every such client lands in one rate-limit bucket and one
//! reputation verdict. Deployments where many clients reach the gateway
//! without those headers will see them throttled together.

use http::HeaderMap;

/// Shared key for requests without a client address header.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client key: `x-real-ip`, then the first `x-forwarded-for`
/// hop, then [`UNKNOWN_CLIENT`].
pub fn client_ip(headers: &HeaderMap) -> String {
    header_value(headers, "x-real-ip")
        .or_else(|| {
            header_value(headers, "x-forwarded-for")
                .and_then(|chain| chain.split(',').next().map(str::trim))
                .filter(|hop| !hop.is_empty())
        })
        .map(str::to_owned)
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
