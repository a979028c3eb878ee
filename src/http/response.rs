//! Response handling and error mapping.
//!
//! # Responsibilities
//! - Map local rejections and upstream failures to HTTP status codes
//! - Render every failure as a JSON envelope with an `error` field
//! - Attach `Retry-After` to rate-limit rejections
//!
//! # Design Decisions
//! - Upstream transport failures become 502, upstream deadlines 504
//! - Messages in the envelope are stable; details may vary

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::security::Decision;

/// JSON body returned for every locally produced error.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Failures that terminate the request pipeline.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Anything other than GET or OPTIONS.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Client exceeded the request rate.
    #[error("rate limited (hard block: {hard_block}), retry after {retry_after_secs}s")]
    RateLimited { hard_block: bool, retry_after_secs: u64 },

    /// Upstream could not be reached or its response could not be read.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Upstream answered with a server error.
    #[error("upstream responded with status {0}")]
    UpstreamStatus(StatusCode),

    /// Upstream did not finish within the configured deadline.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),
}

impl ProxyError {
    /// Build the rejection for a blocking limiter decision.
    pub fn from_decision(decision: Decision) -> Option<Self> {
        let retry_after_secs = decision.retry_after_secs()?;
        Some(ProxyError::RateLimited {
            hard_block: decision.is_hard_block(),
            retry_after_secs,
        })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Upstream(_) | ProxyError::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed => "method_not_allowed",
            ProxyError::RateLimited { hard_block: true, .. } => "hard_block",
            ProxyError::RateLimited { hard_block: false, .. } => "soft_limit",
            ProxyError::Upstream(_) => "transport",
            ProxyError::UpstreamStatus(_) => "status",
            ProxyError::UpstreamTimeout(_) => "timeout",
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ProxyError::MethodNotAllowed => ErrorBody {
                error: "Only GET is allowed on this endpoint",
                detail: None,
            },
            ProxyError::RateLimited { hard_block, .. } => ErrorBody {
                error: "Too many requests",
                detail: Some(if *hard_block {
                    "Temporarily blocked due to very high request rate".to_string()
                } else {
                    "Rate limit exceeded, please slow down".to_string()
                }),
            },
            ProxyError::Upstream(reason) => ErrorBody {
                error: "Bad gateway",
                detail: Some(reason.clone()),
            },
            ProxyError::UpstreamStatus(status) => ErrorBody {
                error: "Bad gateway",
                detail: Some(format!("Upstream responded with status {}", status.as_u16())),
            },
            ProxyError::UpstreamTimeout(reason) => ErrorBody {
                error: "Upstream timeout",
                detail: Some(reason.clone()),
            },
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        let headers = response.headers_mut();
        match &self {
            ProxyError::RateLimited { retry_after_secs, .. } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            ProxyError::MethodNotAllowed => {
                headers.insert(header::ALLOW, HeaderValue::from_static("GET, OPTIONS"));
            }
            _ => {}
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_method_not_allowed_body() {
        let res = ProxyError::MethodNotAllowed.into_response();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(res.headers()[header::ALLOW], "GET, OPTIONS");
        assert_eq!(
            body_json(res).await,
            serde_json::json!({ "error": "Only GET is allowed on this endpoint" })
        );
    }

    #[tokio::test]
    async fn test_soft_limit_envelope() {
        let err = ProxyError::from_decision(Decision::SoftLimited { retry_after_secs: 1 }).unwrap();
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[header::RETRY_AFTER], "1");
        let body = body_json(res).await;
        assert_eq!(body["error"], "Too many requests");
        assert_eq!(body["detail"], "Rate limit exceeded, please slow down");
    }

    #[tokio::test]
    async fn test_hard_block_envelope() {
        let err = ProxyError::from_decision(Decision::HardBlocked { retry_after_secs: 60 }).unwrap();
        assert_eq!(err.kind(), "hard_block");
        let res = err.into_response();
        assert_eq!(res.headers()[header::RETRY_AFTER], "60");
        let body = body_json(res).await;
        assert_eq!(body["detail"], "Temporarily blocked due to very high request rate");
    }

    #[test]
    fn test_admit_is_not_an_error() {
        assert!(ProxyError::from_decision(Decision::Admit).is_none());
    }

    #[tokio::test]
    async fn test_upstream_errors() {
        let res = ProxyError::UpstreamStatus(StatusCode::SERVICE_UNAVAILABLE).into_response();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(res).await;
        assert_eq!(body["error"], "Bad gateway");
        assert_eq!(body["detail"], "Upstream responded with status 503");

        let res = ProxyError::UpstreamTimeout("deadline of 10ms exceeded".into()).into_response();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(res).await["error"], "Upstream timeout");
    }
}
