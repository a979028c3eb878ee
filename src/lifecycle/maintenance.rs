//! Periodic housekeeping for per-gateway state.
//!
//! Neither the limiter nor the cache needs the sweep for correctness; it
//! only bounds memory when many distinct clients or URLs pass through.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time;

use crate::cache::ResponseStore;
use crate::observability::metrics;
use crate::security::RateLimitStore;

/// Sweeps idle client records and expired cache entries for one gateway.
pub struct Sweeper {
    gateway: Arc<str>,
    limiter: Arc<dyn RateLimitStore>,
    store: Arc<dyn ResponseStore>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(
        gateway: Arc<str>,
        limiter: Arc<dyn RateLimitStore>,
        store: Arc<dyn ResponseStore>,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            limiter,
            store,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(
            gateway = %self.gateway,
            interval_secs = self.interval.as_secs(),
            "Sweeper starting"
        );

        let mut ticker = time::interval(self.interval);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::debug!(gateway = %self.gateway, "Sweeper received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Run one sweep pass and return `(clients_removed, entries_removed)`.
    pub fn sweep_once(&self, now: Instant) -> (usize, usize) {
        let clients = self.limiter.sweep(now);
        let entries = self.store.purge_expired(now);

        metrics::record_rate_limit_clients(&self.gateway, self.limiter.len());
        metrics::record_cache_size(&self.gateway, self.store.len());

        if clients > 0 || entries > 0 {
            tracing::debug!(
                gateway = %self.gateway,
                clients_removed = clients,
                entries_removed = entries,
                "Sweep complete"
            );
        }
        (clients, entries)
    }
}
