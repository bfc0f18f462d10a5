//! Periodic full reset of the allow-cache and rate table.
//!
//! Both tables are cleared together on every tick. Each `reset()` takes its
//! table's maintenance gate exclusively, so no request observes a half-cleared
//! table. The task stops on the shutdown broadcast.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::metrics;
use crate::security::{AllowCache, RateLimiter};

/// Clear both tables once. Returns `(allowed_removed, rate_entries_removed)`.
pub fn reset_tables(allow_cache: &AllowCache, limiter: &RateLimiter) -> (usize, usize) {
    let allowed = allow_cache.reset();
    let rate = limiter.reset();
    metrics::set_allow_cache_entries(0);
    metrics::set_rate_table_entries(0);
    (allowed, rate)
}

/// Spawn the reset task. The first reset happens one full `period` after start.
pub fn spawn_reset_task(
    allow_cache: Arc<AllowCache>,
    limiter: Arc<RateLimiter>,
    period: Duration,
    shutdown_tx: &broadcast::Sender<()>,
) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let (allowed, rate) = reset_tables(&allow_cache, &limiter);
                    info!(allowed = allowed, rate_entries = rate, "Periodic reset completed");
                }
                _ = shutdown_rx.recv() => {
                    info!("Reset task stopping");
                    break;
                }
            }
        }
    })
}
