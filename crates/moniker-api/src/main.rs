//! `moniker-api` binary entrypoint.
//!
//! Loads configuration and catalog documents, warms cached queries, and
//! serves HTTP until ctrl-c.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use moniker_api::bootstrap::build_service;
use moniker_api::config::Config;
use moniker_api::metrics::init_metrics;
use moniker_api::server::Server;
use moniker_core::observability::{LogFormat, init_logging};

fn choose_log_format(config: &Config) -> LogFormat {
    if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

async fn wait_for(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(choose_log_format(&config));
    init_metrics();
    tracing::info!(config = ?config, "Configuration loaded");

    let service = Arc::new(build_service(&config).context("failed to load catalog")?);

    let warmed = service.queries().refresh_all_startup().await;
    let failed = warmed.values().filter(|ok| !**ok).count();
    if failed > 0 {
        tracing::warn!(failed, total = warmed.len(), "some cached queries failed to warm");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let queries = Arc::clone(service.queries());
    let refresh_rx = shutdown_rx.clone();
    let refresh = tokio::spawn(async move {
        queries.run_refresh_loop(wait_for(refresh_rx)).await;
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let server = Server::new(config, service);
    server.serve(wait_for(shutdown_rx)).await?;

    refresh.await.context("refresh loop panicked")?;
    Ok(())
}
