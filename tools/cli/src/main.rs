//! Stowaway CLI - runs the storage gateway HTTP server.
//!
//! The gateway holds no state between requests; every request names the
//! backend it wants and the server dials it on the spot.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stowaway_gateway::{router, Gateway, GatewayConfig, NotFoundStatus};
use stowaway_storage::create_default_registry;

#[derive(Parser)]
#[command(name = "stowaway")]
#[command(about = "Stowaway - Stateless object-storage gateway")]
#[command(version)]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, env = "ccport", default_value_t = 3000)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Transfer chunk size in bytes.
    #[arg(long, default_value_t = stowaway_gateway::transfer::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Largest accepted upload, in MiB.
    #[arg(long, default_value_t = 1024)]
    max_upload_mb: usize,

    /// Answer 404 instead of 500 when a container or item does not exist.
    #[arg(long)]
    strict_not_found: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn gateway_config(&self) -> GatewayConfig {
        let not_found_status = if self.strict_not_found {
            NotFoundStatus::Distinct
        } else {
            NotFoundStatus::Compatible
        };

        GatewayConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_max_upload_bytes(self.max_upload_mb.saturating_mul(1024 * 1024))
            .with_not_found_status(not_found_status)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // RUST_LOG overrides the level chosen by --verbose
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase())),
        )
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = create_default_registry().context("Failed to register storage drivers")?;
    info!("Registered drivers: {}", registry.kinds().join(", "));

    let gateway = Arc::new(Gateway::new(Arc::new(registry), cli.gateway_config()));
    let app = router(gateway);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Shutting down");
}
