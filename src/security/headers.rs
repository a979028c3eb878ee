//! Client identity derived from trusted forwarding headers.
//!
//! The edge in front of the proxy stamps the caller's address into a header
//! (e.g. `CF-Connecting-IP`). Headers are consulted in configured order; the
//! first non-empty value wins. Callers without any such header all share the
//! `"unknown"` bucket.

use axum::http::{HeaderMap, HeaderName};

/// Identifier used when no trusted header is present.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Extracts the rate-limit key from request headers.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    headers: Vec<HeaderName>,
}

impl ClientIdentity {
    /// Build from configured header names; invalid names are skipped.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers = names
            .into_iter()
            .filter_map(|name| HeaderName::from_bytes(name.as_ref().as_bytes()).ok())
            .collect();
        Self { headers }
    }

    /// Resolve the client identifier for a request.
    pub fn resolve(&self, headers: &HeaderMap) -> String {
        self.headers
            .iter()
            .filter_map(|name| headers.get(name))
            .filter_map(|value| value.to_str().ok())
            // forwarded-for lists carry the original client first
            .filter_map(|value| value.split(',').next())
            .map(str::trim)
            .find(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_CLIENT)
            .to_string()
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self::new(["cf-connecting-ip", "x-forwarded-for"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(*v));
        }
        map
    }

    #[test]
    fn test_prefers_connecting_ip() {
        let identity = ClientIdentity::default();
        let h = headers(&[("cf-connecting-ip", "1.2.3.4"), ("x-forwarded-for", "9.9.9.9")]);
        assert_eq!(identity.resolve(&h), "1.2.3.4");
    }

    #[test]
    fn test_falls_back_to_forwarded_for() {
        let identity = ClientIdentity::default();
        let h = headers(&[("x-forwarded-for", "5.6.7.8, 10.0.0.1")]);
        assert_eq!(identity.resolve(&h), "5.6.7.8");
    }

    #[test]
    fn test_empty_value_skipped() {
        let identity = ClientIdentity::default();
        let h = headers(&[("cf-connecting-ip", " "), ("x-forwarded-for", "5.6.7.8")]);
        assert_eq!(identity.resolve(&h), "5.6.7.8");
    }

    #[test]
    fn test_unknown_bucket() {
        let identity = ClientIdentity::default();
        assert_eq!(identity.resolve(&HeaderMap::new()), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_custom_header_order() {
        let identity = ClientIdentity::new(["x-real-ip"]);
        let h = headers(&[("x-real-ip", "7.7.7.7"), ("cf-connecting-ip", "1.2.3.4")]);
        assert_eq!(identity.resolve(&h), "7.7.7.7");
    }
}
