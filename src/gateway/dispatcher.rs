//! Per-request gate decision.
//!
//! Evaluation order, first match wins:
//!
//! 0. dot segment       -> [`Action::NotFound`]
//! 1. proxy prefix      -> [`Action::Proxy`]
//! 2. pass-through      -> [`Action::AllowNext`], no checks
//! 3. reputation        -> [`Action::NotFound`] when blocked
//! 4. rate limit        -> [`Action::RateLimited`] when over quota
//! 5. otherwise         -> [`Action::AllowNext`]
//!
//! Reputation always runs before the rate limiter, so a blocked IP never
//! consumes quota.
//!
//! Paths carrying a `.` or `..` segment (plain or percent-encoded) are refused
//! before any prefix is matched. URL joining resolves such segments, so
//! `/growtopia/../admin` would otherwise leave its proxy prefix upstream.

use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tracing::debug;

use crate::config::{ProxyConfig, ProxyRoute};
use crate::metrics;
use crate::security::{Decision, RateLimiter, ReputationService};

/// What the gateway does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Forward verbatim to the route's upstream.
    Proxy(ProxyRoute),
    /// Hand the request to the application routes.
    AllowNext,
    /// Over quota: explicit 429.
    RateLimited,
    /// Blocked by reputation, or a path with dot segments. Rendered as a
    /// plain 404 so the gate stays invisible.
    NotFound,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Proxy(_) => "proxy",
            Action::AllowNext => "allow",
            Action::RateLimited => "rate_limited",
            Action::NotFound => "not_found",
        }
    }
}

/// True when `path` equals `prefix` or continues it at a segment boundary.
fn prefix_matches(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// True when any segment of `path` is `.` or `..` after percent-decoding.
///
/// Backslashes count as separators, as URL parsers treat them that way for
/// http(s).
pub fn has_dot_segment(path: &str) -> bool {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    decoded
        .split(['/', '\\'])
        .any(|segment| segment == "." || segment == "..")
}

/// Composes proxy routing, reputation and rate limiting.
pub struct Dispatcher {
    routes: Vec<ProxyRoute>,
    passthrough: Vec<String>,
    reputation: Arc<ReputationService>,
    limiter: Arc<RateLimiter>,
}

impl Dispatcher {
    pub fn new(
        proxy: &ProxyConfig,
        reputation: Arc<ReputationService>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            routes: proxy.routes.clone(),
            passthrough: proxy.passthrough.clone(),
            reputation,
            limiter,
        }
    }

    /// Decide the action for a request to `path` from client key `ip`.
    pub async fn handle(&self, path: &str, ip: &str) -> Action {
        let action = self.decide(path, ip).await;
        metrics::record_action(action.label());
        action
    }

    async fn decide(&self, path: &str, ip: &str) -> Action {
        if has_dot_segment(path) {
            debug!(ip = %ip, path = %path, "dot segment in path refused");
            return Action::NotFound;
        }

        if let Some(route) = self.routes.iter().find(|r| prefix_matches(path, &r.prefix)) {
            return Action::Proxy(route.clone());
        }

        if self.passthrough.iter().any(|p| prefix_matches(path, p)) {
            debug!(path = %path, "pass-through");
            return Action::AllowNext;
        }

        if self.reputation.evaluate(ip).await == Decision::Blocked {
            return Action::NotFound;
        }

        let admission = self.limiter.admit(ip);
        metrics::set_rate_table_entries(self.limiter.len());
        if !admission.is_admitted() {
            debug!(ip = %ip, "rate limited");
            return Action::RateLimited;
        }

        Action::AllowNext
    }

    pub fn reputation(&self) -> &Arc<ReputationService> {
        &self.reputation
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{AllowCache, Assessment, ReputationBackend};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Backend with a fixed decision, counting assessments.
    struct FixedBackend {
        blocked: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReputationBackend for FixedBackend {
        async fn assess(&self, _ip: &str) -> Assessment {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.blocked {
                Assessment::banned()
            } else {
                Assessment::unavailable("disabled")
            }
        }
    }

    fn dispatcher(blocked: bool) -> (Dispatcher, Arc<FixedBackend>) {
        let backend = Arc::new(FixedBackend {
            blocked,
            calls: AtomicUsize::new(0),
        });
        let reputation = Arc::new(ReputationService::new(
            Arc::clone(&backend) as Arc<dyn ReputationBackend>,
            Arc::new(AllowCache::new()),
        ));
        let proxy = ProxyConfig {
            routes: vec![ProxyRoute {
                prefix: "/growtopia".to_string(),
                upstream: "http://127.0.0.1:9".to_string(),
            }],
            ..ProxyConfig::default()
        };
        let limiter = Arc::new(RateLimiter::with_limits(Duration::from_secs(60), 10));
        (Dispatcher::new(&proxy, reputation, limiter), backend)
    }

    #[test]
    fn test_prefix_matching() {
        assert!(prefix_matches("/growtopia", "/growtopia"));
        assert!(prefix_matches("/growtopia/server_data.php", "/growtopia"));
        assert!(!prefix_matches("/growtopiax", "/growtopia"));
        assert!(prefix_matches("/_next/static/chunk.js", "/_next/static"));
        assert!(prefix_matches("/anything", "/"));
        assert!(!prefix_matches("/favicon.ico.bak", "/favicon.ico"));
    }

    #[tokio::test]
    async fn test_proxy_prefix_skips_checks() {
        let (d, backend) = dispatcher(true);
        for _ in 0..20 {
            assert!(matches!(
                d.handle("/growtopia/server_data.php", "1.2.3.4").await,
                Action::Proxy(_)
            ));
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(d.limiter().is_empty());
    }

    #[tokio::test]
    async fn test_passthrough_skips_checks() {
        let (d, backend) = dispatcher(true);
        assert_eq!(d.handle("/_next/static/app.js", "1.2.3.4").await, Action::AllowNext);
        assert_eq!(d.handle("/favicon.ico", "1.2.3.4").await, Action::AllowNext);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blocked_is_not_found_and_uses_no_quota() {
        let (d, _) = dispatcher(true);
        assert_eq!(d.handle("/player/login/dashboard", "1.2.3.4").await, Action::NotFound);
        assert!(d.limiter().is_empty());
        assert_eq!(d.reputation().stats().blocked, 1);
    }

    #[test]
    fn test_dot_segment_detection() {
        assert!(has_dot_segment("/growtopia/../admin/secret"));
        assert!(has_dot_segment("/growtopia/%2e%2e/admin"));
        assert!(has_dot_segment("/growtopia/%2E./admin"));
        assert!(has_dot_segment("/growtopia/.%2e"));
        assert!(has_dot_segment("/growtopia/./x"));
        assert!(has_dot_segment("/growtopia/..%2fadmin"));
        assert!(has_dot_segment("/growtopia/..\\admin"));
        assert!(has_dot_segment("/growtopia/.."));
        assert!(!has_dot_segment("/growtopia/server_data.php"));
        assert!(!has_dot_segment("/growtopia/..hidden/file...txt"));
        assert!(!has_dot_segment("/"));
    }

    #[tokio::test]
    async fn test_dot_segment_never_proxied() {
        let (d, backend) = dispatcher(false);
        for path in [
            "/growtopia/../admin/secret",
            "/growtopia/%2e%2e/admin/secret",
            "/_next/static/../../player/login/dashboard",
        ] {
            assert_eq!(d.handle(path, "5.6.7.8").await, Action::NotFound, "{path}");
        }
        // Refused before reputation and quota.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(d.limiter().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_after_reputation() {
        let (d, backend) = dispatcher(false);
        for _ in 0..10 {
            assert_eq!(d.handle("/player/login/dashboard", "5.6.7.8").await, Action::AllowNext);
        }
        assert_eq!(d.handle("/player/login/dashboard", "5.6.7.8").await, Action::RateLimited);
        // Allowed once, then served from the allow-cache.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_is_one_bucket() {
        let (d, _) = dispatcher(false);
        for _ in 0..10 {
            d.handle("/", "unknown").await;
        }
        assert_eq!(d.handle("/", "unknown").await, Action::RateLimited);
    }
}
