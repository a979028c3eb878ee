//! Failure injection tests: upstream errors, deadlines and shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;

use fuel_edge_proxy::cache::{CacheKey, CachedResponse, MemoryStore, ResponseStore};
use fuel_edge_proxy::http::{GatewayServer, GatewayState};
use fuel_edge_proxy::security::{RateLimitPolicy, RateLimitStore, SlidingWindowLimiter};
use fuel_edge_proxy::Shutdown;

mod common;

use common::UpstreamBehavior;

#[tokio::test]
async fn test_upstream_server_error_is_bad_gateway_and_not_cached() {
    let upstream = common::start_upstream(UpstreamBehavior {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "maintenance",
        ..UpstreamBehavior::default()
    })
    .await;
    let proxy = common::start_proxy(common::gateway_for(&upstream.base_url())).await;
    let client = common::client();

    for _ in 0..2 {
        let res = client.get(proxy.url("/search")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(res.headers()["access-control-allow-origin"], "*");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "Bad gateway");
        assert_eq!(body["detail"], "Upstream responded with status 503");
        common::settle().await;
    }
    assert_eq!(upstream.hits(), 2);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_client_errors_are_mirrored_but_not_cached() {
    let upstream = common::start_upstream(UpstreamBehavior {
        status: StatusCode::NOT_FOUND,
        body: r#"{"message":"unknown fuel type"}"#,
        ..UpstreamBehavior::default()
    })
    .await;
    let proxy = common::start_proxy(common::gateway_for(&upstream.base_url())).await;
    let client = common::client();

    for _ in 0..2 {
        let res = client.get(proxy.url("/search?type=lpg")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()["access-control-allow-origin"], "*");
        assert_eq!(res.text().await.unwrap(), r#"{"message":"unknown fuel type"}"#);
        common::settle().await;
    }
    assert_eq!(upstream.hits(), 2);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let upstream = common::start_upstream(UpstreamBehavior {
        delay: Duration::from_millis(500),
        ..UpstreamBehavior::default()
    })
    .await;
    let mut gateway = common::gateway_for(&upstream.base_url());
    gateway.upstream.timeout_ms = 100;
    let proxy = common::start_proxy(gateway).await;

    let res = common::client().get(proxy.url("/search")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Upstream timeout");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let addr = common::closed_address().await;
    let proxy = common::start_proxy(common::gateway_for(&format!("http://{addr}"))).await;

    let res = common::client().get(proxy.url("/search")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Bad gateway");
    assert!(body["detail"].is_string());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let upstream = common::start_upstream(UpstreamBehavior::default()).await;
    let mut gateway = common::gateway_for(&upstream.base_url());
    gateway.upstream.max_body_bytes = 16;
    let proxy = common::start_proxy(gateway).await;

    let res = common::client().get(proxy.url("/search")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn test_graceful_shutdown_completes_in_flight_request() {
    let upstream = common::start_upstream(UpstreamBehavior {
        delay: Duration::from_millis(300),
        ..UpstreamBehavior::default()
    })
    .await;
    let proxy = common::start_proxy(common::gateway_for(&upstream.base_url())).await;
    let client = common::client();
    let url = proxy.url("/search");

    let in_flight = {
        let url = url.clone();
        let client = client.clone();
        tokio::spawn(async move { client.get(url).send().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    proxy.shutdown.trigger();

    let res = in_flight.await.unwrap().unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let result = tokio::time::timeout(Duration::from_secs(5), proxy.task)
        .await
        .expect("proxy did not stop")
        .unwrap();
    assert!(result.is_ok());

    assert!(client.get(&url).send().await.is_err());
}

/// Store whose writes take a while to land.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl ResponseStore for SlowStore {
    async fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        self.inner.get(key).await
    }

    async fn put(&self, key: CacheKey, response: CachedResponse) {
        tokio::time::sleep(self.delay).await;
        self.inner.put(key, response).await;
    }

    fn purge_expired(&self, now: Instant) -> usize {
        self.inner.purge_expired(now)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[tokio::test]
async fn test_shutdown_waits_for_pending_cache_writes() {
    let upstream = common::start_upstream(UpstreamBehavior::default()).await;
    let gateway = common::gateway_for(&upstream.base_url());

    let store = Arc::new(SlowStore {
        inner: MemoryStore::from_config(&gateway.cache),
        delay: Duration::from_millis(300),
    });
    let limiter: Arc<dyn RateLimitStore> =
        Arc::new(SlidingWindowLimiter::new(RateLimitPolicy::from(&gateway.rate_limit)));
    let state = GatewayState::with_stores(&gateway, limiter, store.clone()).unwrap();
    let server = GatewayServer::with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let run = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let res = common::client()
        .get(format!("http://{addr}/search?type=euro95"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(store.is_empty(), "write should still be pending");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("gateway did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(store.len(), 1);
    assert!(store
        .get(&CacheKey::for_get(&format!("{}/search?type=euro95", upstream.base_url())))
        .await
        .is_some());
}
