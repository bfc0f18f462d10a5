//! Prometheus metrics for the gateway.
//!
//! All metrics live in a process-wide registry and are exposed on the
//! internal listener at `/metrics`. Recording before [`init`] is a no-op.
//!
//! - `gate_actions_total{action}` - dispatcher outcomes
//! - `gate_reputation_verdicts_total{source,decision}` - uncached assessments
//! - `gate_classifier_unavailable_total{reason}` - fail-open events
//! - `gate_proxy_failures_total{reason}` - upstream errors answered with 502
//! - `gate_proxy_duration_seconds` - upstream round trip latency
//! - `gate_allow_cache_entries` / `gate_rate_table_entries` - table sizes

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Dispatcher outcomes by action.
pub static ACTIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Reputation assessments by verdict source and decision.
pub static REPUTATION_VERDICTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Classifier calls that produced no verdict, by reason.
pub static CLASSIFIER_UNAVAILABLE: OnceLock<IntCounterVec> = OnceLock::new();

/// Upstream failures by reason.
pub static PROXY_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

pub static ALLOW_CACHE_ENTRIES: OnceLock<IntGauge> = OnceLock::new();

pub static RATE_TABLE_ENTRIES: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Proxy round trip latency.
pub static PROXY_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                match $init {
                    Ok(m) => {
                        if let Err(e) = r.register(Box::new(m.clone())) {
                            tracing::warn!(metric = stringify!($metric), error = %e, "Failed to register metric");
                        }
                        let _ = $metric.set(m);
                    }
                    Err(e) => {
                        tracing::warn!(metric = stringify!($metric), error = %e, "Failed to create metric");
                    }
                }
            }
        };
    }

    register!(ACTIONS, IntCounterVec::new(Opts::new("gate_actions_total", "Dispatcher outcomes by action"), &["action"]));
    register!(REPUTATION_VERDICTS, IntCounterVec::new(Opts::new("gate_reputation_verdicts_total", "Reputation assessments by source and decision"), &["source", "decision"]));
    register!(CLASSIFIER_UNAVAILABLE, IntCounterVec::new(Opts::new("gate_classifier_unavailable_total", "Classifier calls that failed open"), &["reason"]));
    register!(PROXY_FAILURES, IntCounterVec::new(Opts::new("gate_proxy_failures_total", "Upstream failures answered with 502"), &["reason"]));
    register!(ALLOW_CACHE_ENTRIES, IntGauge::new("gate_allow_cache_entries", "IPs currently in the allow-cache"));
    register!(RATE_TABLE_ENTRIES, IntGauge::new("gate_rate_table_entries", "IPs currently tracked by the rate limiter"));
    register!(PROXY_DURATION, Histogram::with_opts(
        HistogramOpts::new("gate_proxy_duration_seconds", "Upstream round trip latency")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

#[inline]
pub fn record_action(action: &str) {
    if let Some(c) = ACTIONS.get() {
        c.with_label_values(&[action]).inc();
    }
}

#[inline]
pub fn record_verdict(source: &str, decision: &str) {
    if let Some(c) = REPUTATION_VERDICTS.get() {
        c.with_label_values(&[source, decision]).inc();
    }
}

#[inline]
pub fn record_classifier_unavailable(reason: &str) {
    if let Some(c) = CLASSIFIER_UNAVAILABLE.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn record_proxy_failure(reason: &str) {
    if let Some(c) = PROXY_FAILURES.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn observe_proxy_duration(duration_secs: f64) {
    if let Some(h) = PROXY_DURATION.get() {
        h.observe(duration_secs);
    }
}

#[inline]
pub fn set_allow_cache_entries(count: usize) {
    if let Some(g) = ALLOW_CACHE_ENTRIES.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn set_rate_table_entries(count: usize) {
    if let Some(g) = RATE_TABLE_ENTRIES.get() {
        g.set(count as i64);
    }
}
