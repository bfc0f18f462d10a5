//! Per-IP request quota for the gateway.
//!
//! Fixed-window counter keyed by client IP: at most `max_requests` requests
//! are admitted per `window_secs`. The window resets lazily, at admit time,
//! once more than a full window has elapsed since `window_start`.
//!
//! # Concurrency
//!
//! The read-modify-write on an entry happens under the DashMap shard lock for
//! that key, so two simultaneous requests from one IP can never both observe
//! the same count. A maintenance gate (`RwLock<()>`) is taken shared by
//! `admit` and exclusively by `reset`, which makes the hourly clear an
//! exclusive operation rather than a shard-by-shard sweep.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Counter state for one key.
#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

/// Thread-safe fixed-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, WindowEntry>,
    gate: RwLock<()>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    /// Create a limiter from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(Duration::from_secs(config.window_secs), config.max_requests)
    }

    /// Create a limiter with explicit limits.
    pub fn with_limits(window: Duration, max_requests: u32) -> Self {
        Self {
            entries: DashMap::new(),
            gate: RwLock::new(()),
            window,
            max_requests,
        }
    }

    /// Check whether `key` may make another request now.
    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Check whether `key` may make another request at `now`.
    ///
    /// The first request for an unseen key always opens a window and is
    /// admitted. Rejections do not advance the counter.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let _shared = self.gate.read();

        let mut entry = self
            .entries
            .entry(key.to_owned())
            .or_insert(WindowEntry {
                count: 0,
                window_start: now,
            });

        if now.saturating_duration_since(entry.window_start) > self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.max_requests {
            debug!(key = %key, count = entry.count, "rate limit exceeded");
            return Admission::Rejected;
        }

        entry.count += 1;
        Admission::Admitted
    }

    /// Drop every entry. Excludes concurrent `admit` calls while it runs.
    ///
    /// Returns the number of entries discarded.
    pub fn reset(&self) -> usize {
        let _exclusive = self.gate.write();
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}
