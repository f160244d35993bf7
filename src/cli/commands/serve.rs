//! `reembed serve`: run the HTTP API.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use crate::adapters::http::MigrationHttpServer;
use crate::cli::context::AppContext;
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind host (overrides server.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

pub async fn execute(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let ctx = AppContext::open(config).await?;

    // The server owns the database: anything still marked running was
    // interrupted by a previous process.
    let report = ctx
        .service
        .startup()
        .await
        .context("Startup housekeeping failed")?;
    info!(
        recovered = report.recovered,
        archived = report.archived,
        current_model = %ctx.config.embedding.current_model(),
        "reembed server starting"
    );

    let server = MigrationHttpServer::new(Arc::clone(&ctx.service), ctx.config.server.clone());
    server
        .serve_with_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server failed: {e}"))?;

    let running = ctx.service.orchestrator().active_loops();
    if running > 0 {
        warn!(
            running,
            "Shutting down with migrations in progress; they will be marked interrupted on next start"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
