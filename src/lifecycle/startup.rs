//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every gateway from its profile
//! - Bind all listeners before serving any traffic
//! - Spawn one server and one sweeper per gateway
//! - Wait for all of them to finish after shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind in configuration order

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::cache::FetcherError;
use crate::config::ProxyConfig;
use crate::http::GatewayServer;
use crate::lifecycle::{Shutdown, Sweeper};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("gateway '{gateway}' failed to bind {address}: {source}")]
    Bind {
        gateway: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gateway '{gateway}' failed to build its upstream client: {source}")]
    Fetcher {
        gateway: String,
        #[source]
        source: FetcherError,
    },

    #[error("gateway '{gateway}' server error: {source}")]
    Serve {
        gateway: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gateway task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A gateway whose listener is bound and ready to serve.
pub struct BoundGateway {
    pub server: GatewayServer,
    pub listener: TcpListener,
}

impl BoundGateway {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

/// Build and bind every configured gateway.
pub async fn bind_all(config: &ProxyConfig) -> Result<Vec<BoundGateway>, StartupError> {
    let mut bound = Vec::with_capacity(config.gateways.len());

    for gateway in &config.gateways {
        let server = GatewayServer::new(gateway).map_err(|source| StartupError::Fetcher {
            gateway: gateway.name.clone(),
            source,
        })?;

        let listener = TcpListener::bind(&gateway.bind_address)
            .await
            .map_err(|source| StartupError::Bind {
                gateway: gateway.name.clone(),
                address: gateway.bind_address.clone(),
                source,
            })?;

        tracing::info!(
            gateway = %gateway.name,
            address = %gateway.bind_address,
            upstream = %gateway.upstream.base_url,
            rate_limit = gateway.rate_limit.enabled,
            cache_ttl_secs = gateway.cache.ttl_secs,
            "Gateway bound"
        );
        bound.push(BoundGateway { server, listener });
    }

    Ok(bound)
}

/// Serve bound gateways until `shutdown` fires and every task has stopped.
pub async fn serve(
    config: &ProxyConfig,
    gateways: Vec<BoundGateway>,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let mut servers = JoinSet::new();
    let mut sweepers = JoinSet::new();

    for BoundGateway { server, listener } in gateways {
        let state = server.state().clone();
        let sweeper = Sweeper::new(
            Arc::clone(&state.name),
            Arc::clone(&state.limiter),
            Arc::clone(state.fetcher.store()),
            config.sweep_interval(),
        );
        sweepers.spawn(sweeper.run(shutdown.subscribe()));

        let name = state.name.to_string();
        let rx = shutdown.subscribe();
        servers.spawn(async move {
            server
                .run(listener, rx)
                .await
                .map_err(|source| StartupError::Serve {
                    gateway: name,
                    source,
                })
        });
    }

    let mut first_error = None;
    while let Some(joined) = servers.join_next().await {
        let result = joined.map_err(StartupError::from).and_then(|r| r);
        if let Err(e) = result {
            tracing::error!(error = %e, "Gateway stopped with error");
            // one failed gateway takes the rest down with it
            shutdown.trigger();
            first_error.get_or_insert(e);
        }
    }

    shutdown.trigger();
    while let Some(joined) = sweepers.join_next().await {
        joined?;
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Bind and serve every gateway in `config`.
pub async fn run(config: &ProxyConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    let gateways = bind_all(config).await?;
    serve(config, gateways, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use std::time::Duration;

    fn gateway(name: &str, bind: &str) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.name = name.into();
        config.bind_address = bind.into();
        config.upstream.base_url = "http://127.0.0.1:9".into();
        config
    }

    #[tokio::test]
    async fn test_bind_failure_names_gateway() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let config = ProxyConfig {
            gateways: vec![gateway("fuel", &addr)],
            ..ProxyConfig::default()
        };

        match bind_all(&config).await {
            Err(StartupError::Bind { gateway, address, .. }) => {
                assert_eq!(gateway, "fuel");
                assert_eq!(address, addr);
            }
            other => panic!("expected bind error, got {:?}", other.map(|g| g.len())),
        }
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let config = ProxyConfig {
            gateways: vec![
                gateway("fuel", "127.0.0.1:0"),
                gateway("geocode", "127.0.0.1:0"),
            ],
            ..ProxyConfig::default()
        };
        let gateways = bind_all(&config).await.unwrap();
        assert_eq!(gateways.len(), 2);
        assert!(gateways.iter().all(|g| g.local_addr().is_some()));

        let shutdown = Shutdown::new();
        let task = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { serve(&config, gateways, &shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("gateways did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
