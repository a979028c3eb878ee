//! Edge reverse proxy for public fuel-price and geocoding APIs.
//!
//! Each configured gateway listens on its own address, rate limits callers
//! per client IP, answers CORS preflights, and serves GET requests from a
//! short-lived cache in front of a single upstream.

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
