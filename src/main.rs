//! copilot-sync daemon.
//!
//! Loads the configuration, connects to the scheduler (refusing to start
//! if it is unreachable), runs the reconciler in the background, and
//! serves the Registrar and Discovery gRPC services until SIGINT or
//! SIGTERM.
//!
//! ```text
//! copilot-sync --config /var/vcap/jobs/copilot/config/copilot-sync.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tonic::transport::{Channel, Server};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use copilot_sync::config::{Config, LogFormat, SchedulerConfig};
use copilot_sync::copilot_api::discovery_server::DiscoveryServer;
use copilot_sync::copilot_api::registrar_server::RegistrarServer;
use copilot_sync::grpc::{DiscoveryServiceImpl, RegistrarServiceImpl};
use copilot_sync::health::{self, Readiness};
use copilot_sync::scheduler::{GrpcInstanceSource, Reconciler};
use copilot_sync::store::RouteStore;
use copilot_sync::tls;

#[derive(Parser)]
#[command(name = "copilot-sync", about = "Route state synchronization engine")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short)]
    config: PathBuf,

    /// Overrides the gRPC listen address from the configuration.
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.listen_address = listen;
        config.validate()?;
    }

    init_tracing(config.log_format);
    run(config).await
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,copilot_sync=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run(config: Config) -> Result<()> {
    info!("copilot-sync starting");

    let store = Arc::new(RouteStore::new());
    let readiness = Arc::new(Readiness::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Scheduler ──────────────────────────────────────────────

    let channel = connect_scheduler(&config.scheduler).await?;
    let source = Arc::new(GrpcInstanceSource::new(channel));
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        source,
        config.scheduler.poll_interval(),
        config.scheduler.query_timeout(),
    )
    .with_readiness(Arc::clone(&readiness));

    let stats = reconciler
        .reconcile_once()
        .await
        .context("initial scheduler reconciliation failed")?;
    info!(
        applications = stats.applications,
        endpoints = stats.endpoints,
        "initial reconciliation complete"
    );

    // ── Background tasks ───────────────────────────────────────

    let reconciler_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { reconciler.run(shutdown).await })
    };

    let health_handle = tokio::spawn(health::start_health_server(
        config.health_address,
        readiness,
        shutdown_rx.clone(),
    ));

    // ── gRPC server ────────────────────────────────────────────

    let mut server = Server::builder();
    match &config.tls {
        Some(files) => {
            server = server
                .tls_config(tls::server_tls_config(files)?)
                .context("configuring server TLS")?;
        }
        None => warn!("no server TLS configured, serving plaintext gRPC"),
    }

    let registrar = RegistrarServer::new(RegistrarServiceImpl::new(Arc::clone(&store)));
    let discovery = DiscoveryServer::new(DiscoveryServiceImpl::new(
        Arc::clone(&store),
        shutdown_rx,
    ));

    info!(addr = %config.listen_address, "gRPC server listening");

    server
        .add_service(registrar)
        .add_service(discovery)
        .serve_with_shutdown(config.listen_address, async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("gRPC server failed")?;

    // Wait for background tasks.
    let _ = reconciler_handle.await;
    match health_handle.await {
        Ok(Err(e)) => warn!(error = %e, "health server exited with error"),
        Err(e) => warn!(error = %e, "health server task failed"),
        Ok(Ok(())) => {}
    }

    info!(bindings = store.len(), "copilot-sync stopped");
    Ok(())
}

/// Connects to the scheduler, failing if it cannot be reached.
async fn connect_scheduler(config: &SchedulerConfig) -> Result<Channel> {
    let mut endpoint = tonic::transport::Endpoint::from_shared(config.address.clone())
        .context("invalid scheduler address")?
        .connect_timeout(config.connect_timeout())
        .timeout(config.query_timeout());

    match &config.tls {
        Some(files) => {
            endpoint = endpoint
                .tls_config(tls::client_tls_config(files)?)
                .context("configuring scheduler TLS")?;
        }
        None => warn!("no scheduler TLS configured, connecting in plaintext"),
    }

    let channel = endpoint
        .connect()
        .await
        .with_context(|| format!("connecting to scheduler at {}", config.address))?;
    info!(address = %config.address, "connected to scheduler");
    Ok(channel)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
