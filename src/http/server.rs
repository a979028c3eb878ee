//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (tracing, request ID)
//! - Dispatch each request: preflight, method check, rate limit, fetch
//! - Wrap every non-preflight response with CORS headers
//! - Drain pending cache writes on shutdown
//!
//! # Request Pipeline
//! ```text
//! OPTIONS          → preflight                    → 204
//! not GET          → 405 (JSON)                   → CORS wrap
//! GET, blocked     → 429 (JSON, Retry-After)      → CORS wrap
//! GET, admitted    → cache-aside fetch            → CORS wrap
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{request::Parts, Method, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::cache::{CacheAsideFetcher, FetcherError, MemoryStore, ResponseStore};
use crate::config::GatewayConfig;
use crate::http::cors;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response::ProxyError;
use crate::observability::metrics;
use crate::security::{ClientIdentity, RateLimitPolicy, RateLimitStore, SlidingWindowLimiter};

/// Shared state for one gateway, injected into the handler.
#[derive(Clone)]
pub struct GatewayState {
    pub name: Arc<str>,
    pub rate_limit_enabled: bool,
    pub limiter: Arc<dyn RateLimitStore>,
    pub identity: Arc<ClientIdentity>,
    pub fetcher: Arc<CacheAsideFetcher>,
}

impl GatewayState {
    /// Build the default in-memory state for a gateway profile.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, FetcherError> {
        let limiter: Arc<dyn RateLimitStore> = Arc::new(SlidingWindowLimiter::new(
            RateLimitPolicy::from(&config.rate_limit),
        ));
        let store: Arc<dyn ResponseStore> = Arc::new(MemoryStore::from_config(&config.cache));
        Self::with_stores(config, limiter, store)
    }

    /// Build state around externally supplied stores.
    pub fn with_stores(
        config: &GatewayConfig,
        limiter: Arc<dyn RateLimitStore>,
        store: Arc<dyn ResponseStore>,
    ) -> Result<Self, FetcherError> {
        let fetcher = CacheAsideFetcher::new(
            config.name.clone(),
            &config.upstream,
            &config.cache,
            store,
        )?;

        Ok(Self {
            name: Arc::from(config.name.as_str()),
            rate_limit_enabled: config.rate_limit.enabled,
            limiter,
            identity: Arc::new(ClientIdentity::new(&config.client_ip_headers)),
            fetcher: Arc::new(fetcher),
        })
    }
}

/// HTTP server for one gateway profile.
pub struct GatewayServer {
    router: Router,
    state: GatewayState,
}

impl GatewayServer {
    /// Create a gateway server with in-memory stores.
    pub fn new(config: &GatewayConfig) -> Result<Self, FetcherError> {
        Ok(Self::with_state(GatewayState::from_config(config)?))
    }

    pub fn with_state(state: GatewayState) -> Self {
        let router = build_router(state.clone());
        Self { router, state }
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// The configured router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until a shutdown signal arrives, then flush cache writes.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            gateway = %self.state.name,
            address = %addr,
            "HTTP server starting"
        );

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;

        // pending cache writes are flushed even when serving failed
        self.state.fetcher.drain().await;
        tracing::info!(gateway = %self.state.name, "HTTP server stopped");
        served
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", any(gateway_handler))
        .route("/{*path}", any(gateway_handler))
        .with_state(state)
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

/// Main gateway handler.
async fn gateway_handler(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    // GET-only: the body is never read
    let (parts, _body) = request.into_parts();
    let method = parts.method.clone();

    let response = if method == Method::OPTIONS {
        cors::preflight(&parts.headers)
    } else {
        let response = match dispatch(&state, &parts).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };
        cors::wrap(response)
    };

    metrics::record_request(&state.name, method.as_str(), response.status().as_u16(), start_time);
    response
}

async fn dispatch(state: &GatewayState, request: &Parts) -> Result<Response, ProxyError> {
    let request_id = request.request_id();

    if request.method != Method::GET {
        tracing::debug!(
            gateway = %state.name,
            request_id = %request_id,
            method = %request.method,
            "Method not allowed"
        );
        return Err(ProxyError::MethodNotAllowed);
    }

    if state.rate_limit_enabled {
        let client = state.identity.resolve(&request.headers);
        let decision = state.limiter.admit(&client, Instant::now());
        if let Some(rejection) = ProxyError::from_decision(decision) {
            tracing::warn!(
                gateway = %state.name,
                request_id = %request_id,
                client = %client,
                hard_block = decision.is_hard_block(),
                retry_after = ?decision.retry_after_secs(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(&state.name, rejection.kind());
            return Err(rejection);
        }
    }

    let path_and_query = request
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let (cached, cache_status) = state.fetcher.fetch(path_and_query).await?;
    tracing::debug!(
        gateway = %state.name,
        request_id = %request_id,
        path = %path_and_query,
        status = %cached.status,
        cache = cache_status.as_str(),
        "Proxied request"
    );
    Ok(cached.into_response())
}
