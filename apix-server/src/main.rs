// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  apix: API request logging + dynamic endpoints
//
//  HTTP:      axum on a multi-thread tokio runtime
//  API logs:  dedicated writer thread, one JSON file per request
//  Config:    YAML file + APIX_ env overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use apix_cache::InMemoryCacheStoreRepo;
use apix_core::config::ApixConfig;
use apix_endpoint::{EndpointRegistry, register_cache_endpoints};
use apix_observability::{ApiLogWriter, MetricsCollector, ShutdownOutcome};
use apix_web::{AppState, WebServer};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "apix", version, about = "API request logging and dynamic endpoints")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/apix/apix.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "apix starting");

    // ── Config ──
    if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
    } else {
        info!(
            path = %cli.config.display(),
            "No config file found, reading APIX_ environment overrides only"
        );
    }
    let config = ApixConfig::load(&cli.config)?;

    // ── Metrics ──
    let metrics = Arc::new(MetricsCollector::new(config.metrics.enabled)?);

    // ── API log writer ──
    // logging.directory_path_for_api_logs has no default; startup fails
    // here when it is unset.
    let writer = Arc::new(ApiLogWriter::from_config(&config.logging, Arc::clone(&metrics))?);

    // ── Cache stores + dynamic endpoints ──
    let repo = Arc::new(InMemoryCacheStoreRepo::from_config(&config.cache));
    info!(stores = repo.len(), "Cache stores configured");

    let dispatcher = register_cache_endpoints(
        EndpointRegistry::new().metrics(Arc::clone(&metrics)),
        repo,
    )
    .build();
    info!(endpoints = dispatcher.branches().len(), "Dynamic endpoints registered");

    // ── HTTP server ──
    let state = AppState::new(&config, Arc::clone(&writer), metrics, dispatcher);
    let server = WebServer::new(config.server.addr.clone(), state, axum::Router::new());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("apix-http")
        .build()?;

    let served = rt.block_on(server.start(shutdown_signal()));
    drop(rt);

    // ── Drain API logs ──
    info!("HTTP server stopped, draining API logs");
    match writer.shutdown() {
        ShutdownOutcome::Drained | ShutdownOutcome::AlreadyShutDown => {}
        ShutdownOutcome::TimedOut => warn!("API log queue not fully drained"),
        ShutdownOutcome::WorkerFailed => error!("API log writer had stopped after a fatal error"),
    }

    served?;
    info!("apix stopped");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
