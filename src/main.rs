//! Edge Reverse Proxy
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                  GATEWAY                      │
//!   Client Request    │  ┌──────┐   ┌─────────┐   ┌──────────────┐   │
//!   ──────────────────┼─▶│ CORS │──▶│  rate   │──▶│ cache-aside  │───┼──▶ Upstream
//!                     │  │      │   │ limiter │   │   fetcher    │   │
//!   Client Response   │  │      │   └─────────┘   └──────┬───────┘   │
//!   ◀─────────────────┼──│ wrap │◀───────────────────────┘           │
//!                     │  └──────┘                                    │
//!                     │        sweeper (idle clients, stale cache)   │
//!                     └──────────────────────────────────────────────┘
//! ```
//!
//! One process runs every gateway profile in the configuration file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use fuel_edge_proxy::config::{self, LogFormat};
use fuel_edge_proxy::lifecycle::{signals, startup};
use fuel_edge_proxy::observability::{logging, metrics};
use fuel_edge_proxy::Shutdown;

#[derive(Parser)]
#[command(name = "fuel-edge-proxy")]
#[command(about = "Rate-limited, caching edge proxy", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match config::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!("Configuration OK ({} gateways)", config.gateways.len());
        return ExitCode::SUCCESS;
    }

    if let Some(format) = cli.log_format {
        config.observability.log_format = format;
    }
    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        gateways = config.gateways.len(),
        "fuel-edge-proxy starting"
    );

    if config.observability.metrics_enabled {
        // validated at load time
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            signals::shutdown_signal().await;
            tracing::info!("Shutdown signal received, draining");
            shutdown.trigger();
        });
    }

    match startup::run(&config, &shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Proxy failed");
            ExitCode::FAILURE
        }
    }
}
