//! HTTP server setup.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, middleware};
use moniker_core::{Error, Result};
use moniker_service::ResolutionService;
use serde::Serialize;

use crate::config::Config;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves.
    pub status: String,
    /// Registered catalog nodes.
    pub catalog_nodes: usize,
    /// Registered cached queries.
    pub cached_queries: usize,
}

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Resolution service behind every route.
    pub service: Arc<ResolutionService>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("service", &"<ResolutionService>")
            .finish()
    }
}

impl AppState {
    /// Creates application state.
    #[must_use]
    pub fn new(config: Config, service: Arc<ResolutionService>) -> Self {
        Self { config, service }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        catalog_nodes: state.service.catalog().len().unwrap_or_default(),
        cached_queries: state.service.queries().len(),
    })
}

/// Builds the full router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let metrics_layer = middleware::from_fn(crate::metrics::metrics_middleware);
    let context_layer = middleware::from_fn(crate::context::request_context_middleware);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(crate::metrics::serve_metrics))
        .merge(crate::routes::service_routes().layer(context_layer))
        .layer(metrics_layer)
        .with_state(state)
}

/// The moniker HTTP server.
pub struct Server {
    state: Arc<AppState>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.state.config)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a server for `service`.
    #[must_use]
    pub fn new(config: Config, service: Arc<ResolutionService>) -> Self {
        Self {
            state: Arc::new(AppState::new(config, service)),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Binds the configured port and serves until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the port cannot be bound or the server
    /// fails.
    pub async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = router(Arc::clone(&self.state));

        tracing::info!(http_port = self.state.config.http_port, "Starting moniker API server");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal {
                message: format!("failed to bind to {addr}: {e}"),
            })?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Internal {
                message: format!("server error: {e}"),
            })?;

        tracing::info!("Moniker API server stopped");
        Ok(())
    }
}
