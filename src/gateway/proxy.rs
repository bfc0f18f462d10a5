//! Transparent prefix proxy.
//!
//! Requests under a configured prefix are relayed to the route's upstream:
//! method, body and end-to-end headers as received, full path and query
//! appended to the upstream base. Redirects are not followed; the upstream
//! status, headers and body are relayed as-is. Any network failure or
//! deadline miss becomes a fixed `502 Bad Gateway` and is never retried.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderName, Request, StatusCode, Uri, header};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use super::dispatcher::has_dot_segment;
use crate::config::{ProxyConfig, ProxyRoute};
use crate::error::ProxyError;
use crate::metrics;

/// Headers that are not forwarded in either direction (hop-by-hop).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| name.as_str().eq_ignore_ascii_case(h))
}

/// Header names listed in `Connection`, lowercased. These are hop-by-hop too.
fn connection_tokens(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Copy end-to-end headers. `Host` is left to the client so it names the upstream.
fn copy_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    let listed = connection_tokens(src);
    for (name, value) in src.iter() {
        if is_hop_by_hop(name) || name == header::HOST || listed.contains(name.as_str()) {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
}

/// Join the upstream base with the original path and query.
///
/// Paths with dot segments are refused: `set_path` resolves them, which would
/// move the request outside its prefix.
fn upstream_url(upstream: &str, original: &Uri) -> Result<Url, ProxyError> {
    if has_dot_segment(original.path()) {
        return Err(ProxyError::Url(format!("dot segment in {}", original.path())));
    }
    let mut url = Url::parse(upstream).map_err(|e| ProxyError::Url(e.to_string()))?;
    let path = format!("{}{}", url.path().trim_end_matches('/'), original.path());
    url.set_path(&path);
    url.set_query(original.query());
    Ok(url)
}

fn bad_gateway() -> Response {
    (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
}

/// Outbound HTTP client for proxy routes.
pub struct Forwarder {
    http: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl Forwarder {
    /// Build the proxy client. Redirect following stays disabled; a client
    /// that cannot be built with that policy is a startup error.
    pub fn new(config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            timeout,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Relay `req` to `route`. Always produces a response.
    pub async fn forward(&self, route: &ProxyRoute, req: Request<Body>) -> Response {
        let start = Instant::now();
        let result = self.try_forward(route, req).await;
        metrics::observe_proxy_duration(start.elapsed().as_secs_f64());

        match result {
            Ok(response) => response,
            Err(ProxyError::TooLarge) => {
                debug!(prefix = %route.prefix, limit = self.max_body_bytes, "proxy request body too large");
                metrics::record_proxy_failure("too_large");
                StatusCode::PAYLOAD_TOO_LARGE.into_response()
            }
            Err(ProxyError::Body(reason)) => {
                debug!(prefix = %route.prefix, reason = %reason, "proxy request body unreadable");
                metrics::record_proxy_failure("body");
                StatusCode::BAD_REQUEST.into_response()
            }
            Err(e) => {
                warn!(prefix = %route.prefix, upstream = %route.upstream, error = %e, "proxy upstream failed");
                metrics::record_proxy_failure(e.error_code());
                bad_gateway()
            }
        }
    }

    async fn read_body(&self, body: Body) -> Result<axum::body::Bytes, ProxyError> {
        match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(ProxyError::TooLarge),
            Err(e) => Err(ProxyError::Body(e.to_string())),
        }
    }

    async fn try_forward(&self, route: &ProxyRoute, req: Request<Body>) -> Result<Response, ProxyError> {
        let (parts, body) = req.into_parts();
        let url = upstream_url(&route.upstream, &parts.uri)?;
        let body = self.read_body(body).await?;

        let mut headers = HeaderMap::new();
        copy_headers(&parts.headers, &mut headers);

        debug!(method = %parts.method, url = %url, "proxying");
        let send = self
            .http
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send();

        let upstream = match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(ProxyError::Timeout),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ProxyError::Timeout),
        };

        let status = upstream.status();
        let mut relayed = HeaderMap::new();
        copy_headers(upstream.headers(), &mut relayed);
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = relayed;
        Ok(response)
    }
}
