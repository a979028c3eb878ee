//! Shared utilities for integration tests: a scriptable upstream and a
//! helper that runs a gateway on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use fuel_edge_proxy::config::{GatewayConfig, ProxyConfig};
use fuel_edge_proxy::lifecycle::{startup, Shutdown, StartupError};

/// What the mock upstream answers with.
#[derive(Clone)]
pub struct UpstreamBehavior {
    pub status: StatusCode,
    pub body: &'static str,
    pub headers: Vec<(&'static str, &'static str)>,
    pub delay: Duration,
}

impl Default for UpstreamBehavior {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            body: r#"{"value":[{"title":"Tango Utrecht","prices":[{"fuelType":"EURO95","value":1.899}]}]}"#,
            headers: vec![("content-type", "application/json")],
            delay: Duration::ZERO,
        }
    }
}

/// A request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub uri: String,
    pub headers: HeaderMap,
}

#[derive(Clone)]
struct MockState {
    behavior: UpstreamBehavior,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn mock_handler(State(state): State<MockState>, request: Request<Body>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.seen.lock().unwrap().push(SeenRequest {
        uri: request.uri().to_string(),
        headers: request.headers().clone(),
    });

    if !state.behavior.delay.is_zero() {
        tokio::time::sleep(state.behavior.delay).await;
    }

    let mut response = (state.behavior.status, state.behavior.body).into_response();
    for (name, value) in &state.behavior.headers {
        response.headers_mut().insert(
            HeaderName::from_static(*name),
            HeaderValue::from_static(*value),
        );
    }
    response
}

/// Start a mock upstream on an ephemeral port.
pub async fn start_upstream(behavior: UpstreamBehavior) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let state = MockState {
        behavior,
        hits: hits.clone(),
        seen: seen.clone(),
    };
    let app = Router::new().fallback(mock_handler).with_state(state);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream { addr, hits, seen }
}

/// An address on which nothing is listening.
pub async fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Gateway profile pointed at `base_url`, bound to an ephemeral port.
pub fn gateway_for(base_url: &str) -> GatewayConfig {
    let mut gateway = GatewayConfig::default();
    gateway.bind_address = "127.0.0.1:0".into();
    gateway.upstream.base_url = base_url.to_string();
    gateway
        .upstream
        .headers
        .insert("user-agent".into(), "fuel-edge-proxy-test".into());
    gateway
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), StartupError>>,
}

impl RunningProxy {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }
}

/// Bind and serve a single gateway in the background.
pub async fn start_proxy(gateway: GatewayConfig) -> RunningProxy {
    let config = ProxyConfig {
        gateways: vec![gateway],
        ..ProxyConfig::default()
    };
    let bound = startup::bind_all(&config).await.unwrap();
    let addr = bound[0].local_addr().unwrap();

    let shutdown = Shutdown::new();
    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { startup::serve(&config, bound, &shutdown).await })
    };

    RunningProxy {
        addr,
        shutdown,
        task,
    }
}

/// Client that bypasses system proxies and keeps no idle connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Give deferred cache writes a moment to land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
