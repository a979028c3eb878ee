//! Cross-origin access headers.
//!
//! The proxy is read-only and public, so every response allows any origin.
//! `wrap` sets (never appends) the four allow headers, which makes it safe to
//! apply to cached hits, fresh upstream responses and local errors alike.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET,OPTIONS";
pub const ALLOW_HEADERS: &str = "*";
pub const MAX_AGE: &str = "86400";

/// Answer an `OPTIONS` request.
///
/// A real preflight (both `Origin` and `Access-Control-Request-Method`
/// present) gets the full header set; any other probe only the origin grant.
pub fn preflight(request_headers: &HeaderMap) -> Response {
    let is_preflight = request_headers.contains_key(header::ORIGIN)
        && request_headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;

    if is_preflight {
        apply(response.headers_mut());
    } else {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ALLOW_ORIGIN));
    }
    response
}

/// Add the allow headers to an outgoing response.
pub fn wrap(mut response: Response) -> Response {
    apply(response.headers_mut());
    response
}

fn apply(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ALLOW_ORIGIN));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE));
}
