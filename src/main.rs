use anyhow::{Context, Result};
use clap::Parser;
use proctor_monitor::{create_router, spawn_sweeper, AppState, Config};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Live monitoring server: signaling relay, segment buffer, violation tracking
#[derive(Debug, Parser)]
#[command(name = "proctor-monitor", version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON; extension optional)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("proctor_monitor=info,tower_http=info"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = cli.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "Segment storage: {:?}, retention {}s, sweep every {}s",
        cfg.streaming.storage, cfg.streaming.retention_secs, cfg.streaming.sweep_interval_secs
    );

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let sweep_interval = cfg.streaming.sweep_interval();

    let state = AppState::new(cfg)?;
    if state.config.auth.tokens.is_empty() {
        warn!("No auth tokens configured; every request will be rejected");
    }

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(state.buffer.clone(), sweep_interval, cancel.clone());

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!("Sweeper task panicked: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
