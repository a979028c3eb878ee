//! Cache-aside upstream fetching.
//!
//! # Flow
//! ```text
//! path + query
//!     → upstream URL (base + path + query, verbatim)
//!     → CacheKey (GET + URL)
//!     → hit:  cached response as stored
//!     → miss: upstream GET → buffer body → rewrite Cache-Control
//!             → response to caller + deferred store on the task tracker
//! ```
//!
//! The body is buffered once into `Bytes`; the caller and the deferred write
//! each hold a handle to the same payload.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio_util::task::TaskTracker;

use crate::cache::store::{CacheKey, CachedResponse, ResponseStore};
use crate::config::{CacheConfig, UpstreamConfig};
use crate::http::response::ProxyError;
use crate::observability::metrics;

/// Headers that describe the upstream connection rather than the payload.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Errors building a fetcher.
#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("invalid outbound header '{0}'")]
    InvalidHeader(String),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Whether a response came from the cache or the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

/// Fetches upstream GETs through a shared response cache.
pub struct CacheAsideFetcher {
    gateway: String,
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn ResponseStore>,
    cache_control: HeaderValue,
    timeout: Duration,
    max_body_bytes: usize,
    background: TaskTracker,
}

impl CacheAsideFetcher {
    pub fn new(
        gateway: impl Into<String>,
        upstream: &UpstreamConfig,
        cache: &CacheConfig,
        store: Arc<dyn ResponseStore>,
    ) -> Result<Self, FetcherError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &upstream.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetcherError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| FetcherError::InvalidHeader(name.clone()))?;
            default_headers.insert(header_name, header_value);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(upstream.timeout())
            .build()?;

        let cache_control = HeaderValue::from_str(&format!("public, max-age={}", cache.ttl_secs))
            .map_err(|_| FetcherError::InvalidHeader(header::CACHE_CONTROL.to_string()))?;

        Ok(Self {
            gateway: gateway.into(),
            client,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            store,
            cache_control,
            timeout: upstream.timeout(),
            max_body_bytes: upstream.max_body_bytes,
            background: TaskTracker::new(),
        })
    }

    /// Upstream URL for an inbound path and query, e.g. `/search?q=x`.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    pub fn store(&self) -> &Arc<dyn ResponseStore> {
        &self.store
    }

    /// Serve `path_and_query` from cache, or fetch and cache it.
    pub async fn fetch(&self, path_and_query: &str) -> Result<(CachedResponse, CacheStatus), ProxyError> {
        let url = self.upstream_url(path_and_query);
        let key = CacheKey::for_get(&url);

        if let Some(hit) = self.store.get(&key).await {
            tracing::debug!(gateway = %self.gateway, key = %key, "Cache hit");
            metrics::record_cache_lookup(&self.gateway, CacheStatus::Hit.as_str());
            return Ok((hit, CacheStatus::Hit));
        }
        metrics::record_cache_lookup(&self.gateway, CacheStatus::Miss.as_str());

        let response = match self.fetch_upstream(&url).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(gateway = %self.gateway, url = %url, error = %e, "Upstream fetch failed");
                metrics::record_upstream_error(&self.gateway, e.kind());
                return Err(e);
            }
        };

        if response.status.is_success() {
            self.store_deferred(key, response.clone());
        }
        Ok((response, CacheStatus::Miss))
    }

    /// Wait for every pending cache write to finish.
    pub async fn drain(&self) {
        self.background.close();
        self.background.wait().await;
    }

    fn store_deferred(&self, key: CacheKey, response: CachedResponse) {
        let store = self.store.clone();
        let gateway = self.gateway.clone();
        self.background.spawn(async move {
            store.put(key, response).await;
            metrics::record_cache_size(&gateway, store.len());
        });
    }

    async fn fetch_upstream(&self, url: &str) -> Result<CachedResponse, ProxyError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.read_upstream(url)).await;
        metrics::record_upstream_latency(&self.gateway, started);

        match result {
            Ok(inner) => inner,
            Err(_) => Err(ProxyError::UpstreamTimeout(format!(
                "no complete response within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    async fn read_upstream(&self, url: &str) -> Result<CachedResponse, ProxyError> {
        let mut upstream = self.client.get(url).send().await.map_err(map_reqwest_error)?;

        let status = upstream.status();
        if status.is_server_error() {
            return Err(ProxyError::UpstreamStatus(status));
        }

        if let Some(len) = upstream.content_length() {
            if len > self.max_body_bytes as u64 {
                return Err(ProxyError::Upstream(format!(
                    "response body of {} bytes exceeds limit of {} bytes",
                    len, self.max_body_bytes
                )));
            }
        }

        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);
        headers.insert(header::CACHE_CONTROL, self.cache_control.clone());

        let mut buffer = BytesMut::new();
        while let Some(chunk) = upstream.chunk().await.map_err(map_reqwest_error)? {
            if buffer.len() + chunk.len() > self.max_body_bytes {
                return Err(ProxyError::Upstream(format!(
                    "response body exceeds limit of {} bytes",
                    self.max_body_bytes
                )));
            }
            buffer.extend_from_slice(&chunk);
        }
        let body: Bytes = buffer.freeze();

        tracing::debug!(
            gateway = %self.gateway,
            url = %url,
            status = %status,
            bytes = body.len(),
            "Fetched from upstream"
        );

        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ProxyError {
    if e.is_timeout() {
        ProxyError::UpstreamTimeout(e.to_string())
    } else {
        ProxyError::Upstream(e.to_string())
    }
}
