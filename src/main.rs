//! lvlUSD Monitor - Entry Point
//!
//! Loads configuration, initializes logging and wires the aggregation
//! pipeline. Runs one cycle and prints the report, or in serve mode keeps
//! refreshing the report behind an HTTP server until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config (path from argv, default `config.toml`) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create the RPC provider pool (optionally verify chain id)
//! 4. Create the adapter registry (on-chain, GraphQL, REST)
//! 5. Create the Prometheus registry and the Aggregator
//! 6. One-shot: run a cycle, write JSON to stdout
//! 7. Serve: spawn report server + refresh loop, wait for SIGINT

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use lvlusd_monitor::adapters::chain::RpcPool;
use lvlusd_monitor::adapters::metrics::{MetricsRegistry, ReportServer, ServerState};
use lvlusd_monitor::adapters::registry::AdapterRegistry;
use lvlusd_monitor::config::{self, AppConfig};
use lvlusd_monitor::domain::report::EcosystemReport;
use lvlusd_monitor::ports::telemetry::Telemetry;
use lvlusd_monitor::usecases::Aggregator;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&path).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.log_level)),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        sources = config.sources.len(),
        serve = config.serve.enabled,
        "Starting lvlUSD monitor"
    );

    // ── 3. RPC provider pool ────────────────────────────────
    let pool = Arc::new(RpcPool::new());
    if config.chain.verify_chain_id {
        pool.verify_chain(&config.chain.rpc_url, config.chain.chain_id)
            .await
            .context("RPC endpoint failed chain id verification")?;
    }
    if pool.is_empty() {
        debug!("RPC endpoints connect on first read");
    } else {
        info!(endpoints = pool.len(), "RPC pool ready");
    }

    // ── 4. Adapter registry ─────────────────────────────────
    let registry = AdapterRegistry::connect(
        Arc::clone(&pool),
        &config.http.client_config(),
        config.orchestrator.source_timeout(),
    )
    .context("Failed to create source adapters")?;
    info!(kinds = ?registry.kinds(), "Source adapters registered");

    // ── 5. Metrics + aggregator ─────────────────────────────
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
    let telemetry: Arc<dyn Telemetry> = metrics.clone();
    let aggregator = Aggregator::from_config(&config, registry, telemetry)
        .context("Failed to build source specs")?;

    if !config.serve.enabled {
        // ── 6. One-shot ─────────────────────────────────────
        let report = aggregator.run_cycle().await?;
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
        return Ok(());
    }

    serve(config, aggregator, metrics).await
}

/// Refresh the report every `refresh_interval_seconds` behind the HTTP
/// server until SIGINT.
async fn serve(config: AppConfig, aggregator: Aggregator, metrics: Arc<MetricsRegistry>) -> Result<()> {
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let (report_tx, report_rx) = watch::channel::<Option<Arc<EcosystemReport>>>(None);

    // ── 7a. Report server ───────────────────────────────────
    let server = ReportServer::new(
        ServerState {
            reports: report_rx,
            metrics,
        },
        config.serve.bind_address.clone(),
    );
    let server_shutdown = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_shutdown).await {
            error!(error = %e, "Report server failed");
        }
    });

    // ── 7b. Refresh loop ────────────────────────────────────
    let mut refresh_shutdown = shutdown_tx.subscribe();
    let interval = Duration::from_secs(config.serve.refresh_interval_seconds);
    let refresh_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = refresh_shutdown.recv() => break,
                _ = ticker.tick() => match aggregator.run_cycle().await {
                    Ok(report) => {
                        let _ = report_tx.send(Some(Arc::new(report)));
                    }
                    Err(e) => error!(error = %e, "Aggregation cycle aborted"),
                },
            }
        }
        info!("Refresh loop stopped");
    });

    info!(interval_s = interval.as_secs(), "Serving reports");

    // ── 7c. Wait for SIGINT ─────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT, shutting down");
    }
    info!("SIGINT received, initiating graceful shutdown");
    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(30), refresh_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}
