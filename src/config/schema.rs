//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Gateway profiles hosted by this process.
    pub gateways: Vec<GatewayConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Interval between rate-limit and cache sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            gateways: vec![GatewayConfig::default()],
            observability: ObservabilityConfig::default(),
            sweep_interval_secs: 30,
        }
    }
}

impl ProxyConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// One proxied upstream with its own listener, limiter and cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Label used in logs and metrics.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8787").
    pub bind_address: String,

    /// Upstream the gateway forwards to.
    pub upstream: UpstreamConfig,

    /// Headers carrying the client identity, checked in order.
    pub client_ip_headers: Vec<String>,

    /// Per-client rate limiting policy.
    pub rate_limit: RateLimitConfig,

    /// Response cache settings.
    pub cache: CacheConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: "fuel".to_string(),
            bind_address: "0.0.0.0:8787".to_string(),
            upstream: UpstreamConfig::default(),
            client_ip_headers: vec![
                "cf-connecting-ip".to_string(),
                "x-forwarded-for".to_string(),
            ],
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Upstream API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Absolute base URL; the inbound path and query are appended verbatim.
    pub base_url: String,

    /// Fixed outbound headers sent with every upstream request.
    pub headers: BTreeMap<String, String>,

    /// Deadline for the whole upstream exchange, body included.
    pub timeout_ms: u64,

    /// Largest upstream body the proxy will buffer.
    pub max_body_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anwb.nl".to_string(),
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sliding-window rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Length of the sliding window in milliseconds.
    pub window_ms: u64,

    /// Hits per window above which requests are soft-limited.
    pub soft_limit: usize,

    /// Hits per window above which the client is blocked.
    pub hard_limit: usize,

    /// Duration of a hard block in seconds.
    pub block_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 1_000,
            soft_limit: 5,
            hard_limit: 10,
            block_secs: 60,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached response; also advertised as `max-age`.
    pub ttl_secs: u64,

    /// Maximum number of cached responses.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 10,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
