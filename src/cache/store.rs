//! Response cache storage.
//!
//! Entries are keyed by the upstream request (method and full URL) and expire
//! a fixed TTL after insertion. The store never looks at inbound headers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use dashmap::DashMap;

use crate::config::CacheConfig;

/// Minimum spacing between purges triggered by a full store.
const FULL_PURGE_INTERVAL: Duration = Duration::from_secs(1);

const NEVER: u64 = u64::MAX;

/// Canonical identity of a cacheable upstream request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a GET of `url`.
    pub fn for_get(url: &str) -> Self {
        Self(format!("GET {}", url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully buffered upstream response.
///
/// The body is a `Bytes` handle, so cloning shares the payload instead of
/// copying it.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Shared response cache.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Return a live entry for `key`, if any.
    async fn get(&self, key: &CacheKey) -> Option<CachedResponse>;

    /// Store `response` under `key`, replacing any previous entry.
    async fn put(&self, key: CacheKey, response: CachedResponse);

    /// Remove expired entries; returns how many were dropped.
    fn purge_expired(&self, now: Instant) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    response: CachedResponse,
    expires_at: Instant,
}

/// Process-local TTL cache.
///
/// A full store purges expired entries at most once per
/// `FULL_PURGE_INTERVAL`; the sweeper handles the rest.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<CacheKey, StoredEntry>>,
    ttl: Duration,
    max_entries: usize,
    epoch: Instant,
    /// Millis since `epoch` of the last full-store purge, or `NEVER`.
    last_full_purge: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            max_entries,
            epoch: Instant::now(),
            last_full_purge: Arc::new(AtomicU64::new(NEVER)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lookup(&self, key: &CacheKey, now: Instant) -> Option<CachedResponse> {
        let expired = {
            let entry = self.entries.get(key)?;
            if now < entry.expires_at {
                return Some(entry.response.clone());
            }
            entry.expires_at
        };
        // only drop the entry we saw; a fresh put may have replaced it
        self.entries
            .remove_if(key, |_, entry| entry.expires_at == expired);
        None
    }

    fn insert(&self, key: CacheKey, response: CachedResponse, now: Instant) -> bool {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            if self.claim_full_purge(now) {
                self.purge_expired(now);
            }
            if self.entries.len() >= self.max_entries {
                tracing::debug!(key = %key, capacity = self.max_entries, "Cache full, entry not stored");
                return false;
            }
        }
        let Some(expires_at) = now.checked_add(self.ttl) else {
            tracing::debug!(key = %key, "Cache TTL out of range, entry not stored");
            return false;
        };
        self.entries.insert(key, StoredEntry { response, expires_at });
        true
    }

    /// Whether this caller may run a full-store purge at `now`.
    fn claim_full_purge(&self, now: Instant) -> bool {
        let now_ms = now.saturating_duration_since(self.epoch).as_millis() as u64;
        let last = self.last_full_purge.load(Ordering::Relaxed);
        if last != NEVER
            && now_ms.saturating_sub(last) < FULL_PURGE_INTERVAL.as_millis() as u64
        {
            return false;
        }
        self.last_full_purge
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        self.lookup(key, Instant::now())
    }

    async fn put(&self, key: CacheKey, response: CachedResponse) {
        self.insert(key, response, Instant::now());
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
