//! Vellum server binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vellum_core::config::{LogFormat, LoggingConfig};
use vellum_server::{AppState, create_router, load_config};
use vellum_store::{DocumentStore, StoreOptions};

/// Vellum - A content-addressable JSON document store
#[derive(Parser, Debug)]
#[command(name = "vellumd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "VELLUM_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tower_http=info", logging.level).into());
    let json = logging.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

/// Resolves once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration (file is optional, env vars can provide/override everything)
    let config = load_config(&args.config).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    init_tracing(&config.logging);
    tracing::info!("Vellum v{}", env!("CARGO_PKG_VERSION"));
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loaded configuration from file");
    } else {
        tracing::info!(config_path = %args.config, "No config file found, using defaults and environment");
    }

    // Register Prometheus metrics
    vellum_server::metrics::register_metrics();

    // Connect and migrate
    let engine = vellum_store::from_config(&config.database)
        .await
        .context("failed to initialize document store")?;
    let store = DocumentStore::new(engine, StoreOptions::from(&config.limits));
    store
        .health_check()
        .await
        .context("database health check failed")?;
    tracing::info!(backend = store.backend(), "Document store ready");

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);

    let state = AppState::new(config, store.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("Listening on {}", addr);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut graceful_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = graceful_rx.wait_for(|stop| *stop).await;
    });

    // In-flight requests get `grace` to finish once shutdown starts
    let grace_elapsed = async move {
        if shutdown_rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.context("server error")?,
        _ = grace_elapsed => {
            tracing::warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed, dropping open connections");
        }
    }

    store.close().await;
    tracing::info!("Server exited");
    Ok(())
}
