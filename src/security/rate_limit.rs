//! Per-client sliding-window rate limiting with two penalty tiers.
//!
//! Every admitted attempt is recorded in a trailing window. Above
//! `soft_limit` hits the client is told to slow down; above `hard_limit`
//! it is blocked for `block_duration`. Attempts made while blocked are
//! rejected without being recorded, so they never extend the block.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Thresholds and durations applied by a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub soft_limit: usize,
    pub hard_limit: usize,
    pub block_duration: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            window: Duration::from_millis(config.window_ms),
            soft_limit: config.soft_limit,
            hard_limit: config.hard_limit,
            block_duration: Duration::from_secs(config.block_secs),
        }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    /// Too many hits in the window; no block timer is armed.
    SoftLimited { retry_after_secs: u64 },
    /// The client is serving a timed block.
    HardBlocked { retry_after_secs: u64 },
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        !matches!(self, Decision::Admit)
    }

    pub fn is_hard_block(&self) -> bool {
        matches!(self, Decision::HardBlocked { .. })
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Admit => None,
            Decision::SoftLimited { retry_after_secs }
            | Decision::HardBlocked { retry_after_secs } => Some(*retry_after_secs),
        }
    }
}

/// Window state tracked for one client identifier.
#[derive(Debug, Default, Clone)]
pub struct ClientRateRecord {
    /// Hit instants in arrival order.
    hits: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

impl ClientRateRecord {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            self.hits.pop_front();
        }
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.hits.is_empty() && self.blocked_until.map_or(true, |until| now >= until)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    pub fn blocked_until(&self) -> Option<Instant> {
        self.blocked_until
    }
}

/// Backing store for rate-limit state.
///
/// The in-process [`SlidingWindowLimiter`] is the only implementation; a
/// shared counter service can be slotted in behind the same seam.
pub trait RateLimitStore: Send + Sync {
    /// Record an attempt by `client_id` at `now` and decide its fate.
    fn admit(&self, client_id: &str, now: Instant) -> Decision;

    /// Drop records with an empty window and no active block.
    fn sweep(&self, now: Instant) -> usize;

    /// Number of tracked clients.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory limiter keyed by client identifier.
///
/// Each client's read-modify-write runs under its DashMap shard lock, so
/// concurrent requests from one client are evaluated one at a time.
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    records: DashMap<String, ClientRateRecord>,
    policy: RateLimitPolicy,
}

impl SlidingWindowLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            records: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Snapshot of a client's record, mainly for inspection in tests.
    pub fn record(&self, client_id: &str) -> Option<ClientRateRecord> {
        self.records.get(client_id).map(|r| r.value().clone())
    }

    fn soft_retry_after(&self) -> u64 {
        ceil_secs(self.policy.window).max(1)
    }
}

impl RateLimitStore for SlidingWindowLimiter {
    fn admit(&self, client_id: &str, now: Instant) -> Decision {
        let policy = self.policy;
        let mut record = self.records.entry(client_id.to_owned()).or_default();

        if let Some(until) = record.blocked_until {
            if now < until {
                return Decision::HardBlocked {
                    retry_after_secs: ceil_secs(until - now),
                };
            }
            record.blocked_until = None;
        }

        record.hits.push_back(now);
        record.prune(now, policy.window);
        let count = record.hits.len();

        if count > policy.hard_limit {
            record.blocked_until = Some(deadline(now, policy.block_duration));
            return Decision::HardBlocked {
                retry_after_secs: policy.block_duration.as_secs(),
            };
        }

        if count > policy.soft_limit {
            return Decision::SoftLimited {
                retry_after_secs: self.soft_retry_after(),
            };
        }

        Decision::Admit
    }

    fn sweep(&self, now: Instant) -> usize {
        let window = self.policy.window;
        let before = self.records.len();
        self.records.retain(|_, record| {
            record.prune(now, window);
            !record.is_idle(now)
        });
        before.saturating_sub(self.records.len())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// `now + duration`, clamped to the latest instant the platform can hold.
fn deadline(now: Instant, mut duration: Duration) -> Instant {
    loop {
        if let Some(at) = now.checked_add(duration) {
            return at;
        }
        duration /= 2;
    }
}

/// Round a duration up to whole seconds.
fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    millis.div_ceil(1000) as u64
}
