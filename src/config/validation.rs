//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits ordered)
//! - Detect conflicting gateways (duplicate names or listeners)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::{GatewayConfig, ProxyConfig};

/// Longest hard block a gateway may impose.
pub const MAX_BLOCK_SECS: u64 = 86_400;

/// Longest a response may stay cached.
pub const MAX_TTL_SECS: u64 = 86_400;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check the configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.gateways.is_empty() {
        errors.push(ValidationError::new("gateways", "at least one gateway is required"));
    }
    if config.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("sweep_interval_secs", "must be greater than zero"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let mut names = HashSet::new();
    let mut binds = HashSet::new();
    for (i, gateway) in config.gateways.iter().enumerate() {
        let prefix = format!("gateways[{}]", i);
        if !names.insert(gateway.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", prefix),
                format!("duplicate gateway name '{}'", gateway.name),
            ));
        }
        if !binds.insert(gateway.bind_address.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.bind_address", prefix),
                format!("'{}' is already used by another gateway", gateway.bind_address),
            ));
        }
        validate_gateway(&prefix, gateway, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_gateway(prefix: &str, gateway: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    if gateway.name.trim().is_empty() {
        errors.push(ValidationError::new(format!("{}.name", prefix), "must not be empty"));
    }
    if gateway.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            format!("{}.bind_address", prefix),
            format!("'{}' is not a socket address", gateway.bind_address),
        ));
    }

    let upstream = &gateway.upstream;
    match Url::parse(&upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
            if url.query().is_some() || url.fragment().is_some() {
                errors.push(ValidationError::new(
                    format!("{}.upstream.base_url", prefix),
                    "must not carry a query or fragment",
                ));
            }
        }
        Ok(_) => errors.push(ValidationError::new(
            format!("{}.upstream.base_url", prefix),
            "must be an absolute http(s) URL",
        )),
        Err(e) => errors.push(ValidationError::new(
            format!("{}.upstream.base_url", prefix),
            e.to_string(),
        )),
    }
    for (name, value) in &upstream.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("{}.upstream.headers", prefix),
                format!("invalid header name '{}'", name),
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::new(
                format!("{}.upstream.headers", prefix),
                format!("invalid value for header '{}'", name),
            ));
        }
    }
    if upstream.timeout_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.upstream.timeout_ms", prefix),
            "must be greater than zero",
        ));
    }
    if upstream.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            format!("{}.upstream.max_body_bytes", prefix),
            "must be greater than zero",
        ));
    }

    for header in &gateway.client_ip_headers {
        if HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("{}.client_ip_headers", prefix),
                format!("invalid header name '{}'", header),
            ));
        }
    }

    let limits = &gateway.rate_limit;
    if limits.window_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.rate_limit.window_ms", prefix),
            "must be greater than zero",
        ));
    }
    if limits.block_secs == 0 || limits.block_secs > MAX_BLOCK_SECS {
        errors.push(ValidationError::new(
            format!("{}.rate_limit.block_secs", prefix),
            format!("must be between 1 and {}", MAX_BLOCK_SECS),
        ));
    }
    if limits.soft_limit >= limits.hard_limit {
        errors.push(ValidationError::new(
            format!("{}.rate_limit", prefix),
            format!(
                "soft_limit ({}) must be below hard_limit ({})",
                limits.soft_limit, limits.hard_limit
            ),
        ));
    }

    if gateway.cache.ttl_secs == 0 || gateway.cache.ttl_secs > MAX_TTL_SECS {
        errors.push(ValidationError::new(
            format!("{}.cache.ttl_secs", prefix),
            format!("must be between 1 and {}", MAX_TTL_SECS),
        ));
    }
    if gateway.cache.max_entries == 0 {
        errors.push(ValidationError::new(
            format!("{}.cache.max_entries", prefix),
            "must be greater than zero",
        ));
    }
}
