//! IP reputation decisions.
//!
//! Per IP, a single pass:
//!
//! ```text
//! cached-allowed ─────────────────────────────────────────────► Allowed
//! uncached ─► enrich ─► ban list ─┬─ match ───────────────────► Blocked
//!                                 └─ no match ─► classifier ─┬─ flagged ──► Blocked
//!                                                            └─ clear / unavailable ─► Allowed
//! ```
//!
//! `Allowed` is remembered in the [`AllowCache`] until the periodic reset.
//! `Blocked` is never cached: a blocked IP is assessed again on its next
//! request, so lifting a ban in the pattern file takes effect immediately.
//! The price is that a persistently abusive IP pays for enrichment and
//! classification on every request.
//!
//! The classifier fails open. A missed VPN is preferred over refusing
//! legitimate players when the classifier is down.

use async_trait::async_trait;
use dashmap::DashSet;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::security::ban_list::BanList;
use crate::security::classifier::{Classifier, Verdict};
use crate::security::geo::Enricher;

/// Final reputation decision for an IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Blocked,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allowed => "allowed",
            Decision::Blocked => "blocked",
        }
    }
}

/// Which stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    /// A ban pattern matched.
    BanList,
    /// The classifier returned a verdict.
    Classifier,
    /// A sibling reputation service answered.
    Remote,
    /// No verdict could be obtained; failed open.
    Unavailable { reason: &'static str },
}

impl VerdictSource {
    pub fn label(&self) -> &'static str {
        match self {
            VerdictSource::BanList => "ban_list",
            VerdictSource::Classifier => "classifier",
            VerdictSource::Remote => "remote",
            VerdictSource::Unavailable { .. } => "unavailable",
        }
    }
}

/// Result of assessing one IP, before caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub decision: Decision,
    pub source: VerdictSource,
    /// Graded verdict when the classifier (or a remote service) supplied one.
    pub verdict: Option<Verdict>,
}

impl Assessment {
    pub fn banned() -> Self {
        Self {
            decision: Decision::Blocked,
            source: VerdictSource::BanList,
            verdict: None,
        }
    }

    pub fn classified(verdict: Verdict) -> Self {
        Self {
            decision: if verdict.flagged() {
                Decision::Blocked
            } else {
                Decision::Allowed
            },
            source: VerdictSource::Classifier,
            verdict: Some(verdict),
        }
    }

    pub fn unavailable(reason: &'static str) -> Self {
        Self {
            decision: Decision::Allowed,
            source: VerdictSource::Unavailable { reason },
            verdict: None,
        }
    }
}

/// Produces an [`Assessment`] for a client IP.
#[async_trait]
pub trait ReputationBackend: Send + Sync {
    async fn assess(&self, ip: &str) -> Assessment;
}

// ============================================================================
// Local assessment: enrichment + ban list + classifier
// ============================================================================

/// In-process assessor.
pub struct LocalAssessor {
    enricher: Arc<dyn Enricher>,
    ban_list: Arc<BanList>,
    classifier: Arc<dyn Classifier>,
}

impl LocalAssessor {
    pub fn new(
        enricher: Arc<dyn Enricher>,
        ban_list: Arc<BanList>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            enricher,
            ban_list,
            classifier,
        }
    }
}

#[async_trait]
impl ReputationBackend for LocalAssessor {
    async fn assess(&self, ip: &str) -> Assessment {
        let subject = self.enricher.lookup(ip).subject();
        let bans = self.ban_list.snapshot();

        if bans.matches(&subject) {
            debug!(ip = %ip, "blocked by ban list");
            return Assessment::banned();
        }

        match self.classifier.classify(&subject, bans.source()).await {
            Ok(verdict) => {
                debug!(ip = %ip, ?verdict, "classifier verdict");
                Assessment::classified(verdict)
            }
            Err(e) => {
                warn!(ip = %ip, reason = e.error_code(), error = %e, "classifier unavailable, failing open");
                metrics::record_classifier_unavailable(e.error_code());
                Assessment::unavailable(e.error_code())
            }
        }
    }
}

// ============================================================================
// Remote assessment: sibling `/check-ip` service
// ============================================================================

/// Reply body of `GET /check-ip/{ip}`: either `{status}` or a graded verdict.
#[derive(Debug, Deserialize)]
struct RemoteReply {
    status: Option<bool>,
    is_vpn: Option<bool>,
    is_vps: Option<bool>,
    is_proxy: Option<bool>,
    confidence: Option<f64>,
}

/// Assessor that queries a sibling reputation service.
///
/// Non-2xx replies, timeouts and bodies that are neither shape fail open.
pub struct RemoteAssessor {
    http: reqwest::Client,
    base: reqwest::Url,
    timeout: Duration,
}

impl RemoteAssessor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, String> {
        let base = reqwest::Url::parse(base_url).map_err(|e| e.to_string())?;
        if base.cannot_be_a_base() {
            return Err(format!("{} cannot be a base URL", base_url));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("loginurl-gate/1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self {
            http,
            base,
            timeout,
        })
    }

    fn url_for(&self, ip: &str) -> reqwest::Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("check-ip").push(ip);
        }
        url
    }

    async fn query(&self, ip: &str) -> Result<RemoteReply, &'static str> {
        let response = self
            .http
            .get(self.url_for(ip))
            .send()
            .await
            .map_err(|_| "request")?;
        if !response.status().is_success() {
            return Err("status");
        }
        response.json::<RemoteReply>().await.map_err(|_| "parse")
    }
}

#[async_trait]
impl ReputationBackend for RemoteAssessor {
    async fn assess(&self, ip: &str) -> Assessment {
        let reply = match tokio::time::timeout(self.timeout, self.query(ip)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(reason)) => {
                warn!(ip = %ip, reason, "reputation service unavailable, failing open");
                return Assessment::unavailable(reason);
            }
            Err(_) => {
                warn!(ip = %ip, "reputation service timed out, failing open");
                return Assessment::unavailable("timeout");
            }
        };

        let graded = reply.is_vpn.is_some() || reply.is_vps.is_some() || reply.is_proxy.is_some();
        if reply.status.is_none() && !graded {
            warn!(ip = %ip, "reputation service reply had no verdict, failing open");
            return Assessment::unavailable("parse");
        }

        let verdict = graded.then(|| Verdict {
            is_vpn: reply.is_vpn.unwrap_or(false),
            is_vps: reply.is_vps.unwrap_or(false),
            is_proxy: reply.is_proxy.unwrap_or(false),
            confidence: reply
                .confidence
                .map(|c| c.clamp(0.0, 100.0) as u8)
                .unwrap_or(0),
        });
        let blocked = reply.status == Some(true) || verdict.is_some_and(|v| v.flagged());

        Assessment {
            decision: if blocked {
                Decision::Blocked
            } else {
                Decision::Allowed
            },
            source: VerdictSource::Remote,
            verdict,
        }
    }
}

// ============================================================================
// Allow-cache
// ============================================================================

/// Process-wide set of IPs already judged `Allowed`.
///
/// No per-entry expiry: entries live until [`AllowCache::reset`], which takes
/// the maintenance gate exclusively.
#[derive(Debug, Default)]
pub struct AllowCache {
    entries: DashSet<String>,
    gate: RwLock<()>,
}

impl AllowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ip: &str) -> bool {
        let _shared = self.gate.read();
        self.entries.contains(ip)
    }

    pub fn insert(&self, ip: &str) {
        let _shared = self.gate.read();
        self.entries.insert(ip.to_owned());
    }

    /// Drop every entry. Returns the number discarded.
    pub fn reset(&self) -> usize {
        let _exclusive = self.gate.write();
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Decision service
// ============================================================================

/// Snapshot of per-service counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReputationStats {
    pub evaluations: u64,
    pub cache_hits: u64,
    pub allowed: u64,
    pub blocked: u64,
    pub classifier_unavailable: u64,
}

#[derive(Debug, Default)]
struct Counters {
    evaluations: AtomicU64,
    cache_hits: AtomicU64,
    allowed: AtomicU64,
    blocked: AtomicU64,
    classifier_unavailable: AtomicU64,
}

/// Reputation decision service: allow-cache in front of a backend.
pub struct ReputationService {
    backend: Arc<dyn ReputationBackend>,
    allow_cache: Arc<AllowCache>,
    counters: Counters,
}

impl ReputationService {
    pub fn new(backend: Arc<dyn ReputationBackend>, allow_cache: Arc<AllowCache>) -> Self {
        info!("reputation service initialized");
        Self {
            backend,
            allow_cache,
            counters: Counters::default(),
        }
    }

    /// Decide whether `ip` may pass.
    pub async fn evaluate(&self, ip: &str) -> Decision {
        self.counters.evaluations.fetch_add(1, Ordering::Relaxed);

        if self.allow_cache.contains(ip) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Decision::Allowed;
        }

        let assessment = self.backend.assess(ip).await;
        metrics::record_verdict(assessment.source.label(), assessment.decision.as_str());

        if let VerdictSource::Unavailable { .. } = assessment.source {
            self.counters
                .classifier_unavailable
                .fetch_add(1, Ordering::Relaxed);
        }

        match assessment.decision {
            Decision::Allowed => {
                self.counters.allowed.fetch_add(1, Ordering::Relaxed);
                self.allow_cache.insert(ip);
                metrics::set_allow_cache_entries(self.allow_cache.len());
            }
            Decision::Blocked => {
                self.counters.blocked.fetch_add(1, Ordering::Relaxed);
                info!(ip = %ip, source = assessment.source.label(), "ip blocked");
            }
        }

        assessment.decision
    }

    /// The shared allow-cache.
    pub fn allow_cache(&self) -> &Arc<AllowCache> {
        &self.allow_cache
    }

    pub fn stats(&self) -> ReputationStats {
        ReputationStats {
            evaluations: self.counters.evaluations.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            allowed: self.counters.allowed.load(Ordering::Relaxed),
            blocked: self.counters.blocked.load(Ordering::Relaxed),
            classifier_unavailable: self
                .counters
                .classifier_unavailable
                .load(Ordering::Relaxed),
        }
    }
}
