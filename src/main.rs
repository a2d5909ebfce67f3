//! Tanglewatch - Confirmation-Watchdog Proxy
//!
//! This is the main entry point for the tanglewatch proxy, sitting between
//! wallet clients and an IRI node.
//!
//! ## Features
//!
//! - **Transparent Forwarding**: every request passes through unchanged
//! - **Submission Observation**: attach/store payloads are parsed off the hot path
//! - **Confirmation Retry**: per-bundle reattach cycles on a fixed cadence
//! - **Promotion**: bounded zero-value spam after every reattach
//! - **Comprehensive Metrics**: Prometheus integration

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tanglewatch::config::Config;
use tanglewatch::ledger::IriClient;
use tanglewatch::proxy::{self, ProxyState};
use tanglewatch::tracker::{TrackerRegistry, TrackerSettings};
use tanglewatch::{endpoints, metrics};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Override the proxy listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose)?;

    info!("🚀 Starting Tanglewatch Confirmation Proxy");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    info!("📋 Loading configuration from: {}", args.config);
    let mut config = load_config(&args.config)?;
    if let Some(port) = args.port {
        config.proxy.listen_port = port;
    }
    info!("🌐 Node endpoint: {}", config.node.endpoint);

    // Initialize metrics
    if config.monitoring.enable_metrics {
        let metrics_port = config.monitoring.metrics_port;
        info!("📊 Starting metrics server on port {}", metrics_port);
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(metrics_port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    // Initialize the node client and the tracker registry
    let client = Arc::new(IriClient::new(&config.node).context("Failed to build node client")?);
    let settings = TrackerSettings::from_config(&config);
    info!(
        "🔁 Retry schedule: every {}s, {} attempts max",
        config.retry.cadence_secs, config.retry.max_attempts
    );
    let registry = TrackerRegistry::new(client, settings);

    // Start the proxy
    let state = ProxyState::new(&config, Arc::clone(&registry))
        .context("Failed to build proxy state")?;
    let proxy_config = config.clone();
    let mut proxy_task = tokio::spawn(async move { proxy::serve(&proxy_config, state).await });

    info!("✅ All components initialized successfully");

    // Main loop: periodic statistics until shutdown
    let mut stats_interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = stats_interval.tick() => {
                let m = metrics::metrics();
                info!("📊 Statistics:");
                info!("   Requests proxied: {}", m.requests_proxied.get());
                info!("   Bundles tracked: {}", m.bundles_tracked.get());
                info!("   Active trackers: {}", registry.active_count());
                info!("   Confirmed: {}", m.bundles_confirmed.get());
                info!("   Exhausted: {}", m.bundles_exhausted.get());
            }

            result = &mut proxy_task => {
                match result {
                    Ok(Ok(())) => warn!("Proxy server stopped"),
                    Ok(Err(e)) => error!("Proxy server error: {}", e),
                    Err(e) => error!("Proxy task panicked: {}", e),
                }
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                break;
            }
        }
    }

    registry.shutdown();
    info!("👋 Tanglewatch stopped");
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "tanglewatch=debug,info"
    } else {
        "tanglewatch=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        Ok(Config::default())
    }
}
