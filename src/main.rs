mod auth;
mod config;
mod health;
mod http;
mod identity;
mod metrics;
mod route;
mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::auth::KeyVerifier;
use crate::metrics::MetricsRegistry;
use crate::route::{RouteResolver, TrustedFingerprints};
use crate::store::UserStore;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "sshgate", about = "SSH gateway authentication and routing webhooks")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/sshgate/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Read-only state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: RouteResolver,
    pub verifier: KeyVerifier,
    pub store: Arc<dyn UserStore>,
    pub metrics: MetricsRegistry,
}

impl AppState {
    pub fn new(
        fingerprints: TrustedFingerprints,
        store: Arc<dyn UserStore>,
        metrics: MetricsRegistry,
    ) -> Self {
        let resolver = RouteResolver::new(fingerprints);
        metrics
            .metrics
            .trusted_fingerprints
            .set(resolver.fingerprints().len() as i64);
        Self {
            resolver,
            verifier: KeyVerifier::new(Arc::clone(&store)),
            store,
            metrics,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState, listen: &str) -> Result<()> {
    let app = http::handler::create_router(Arc::new(state));

    let listen_addr: std::net::SocketAddr = listen.parse().context("invalid listen address")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    tracing::info!(config_path = %cli.config, "starting sshgate");

    // ---- Trusted backend host keys ----
    let fingerprints = config::load_fingerprints(&config.routing)?;
    if fingerprints.is_empty() {
        tracing::warn!("no trusted backend fingerprints configured; the gateway will refuse every backend");
    }
    tracing::info!(count = fingerprints.len(), "trusted fingerprints loaded");

    // ---- User store ----
    let store = store::build_store(&config.store).await?;

    // ---- App state ----
    let state = AppState::new(fingerprints, store, MetricsRegistry::new());

    run_http_server(state, &config.server.listen).await?;

    tracing::info!("sshgate shut down cleanly");
    Ok(())
}
