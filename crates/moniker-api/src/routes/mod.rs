//! HTTP route handlers.

pub mod catalog;
pub mod requests;
pub mod resolve;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// All service routes except health and metrics.
pub fn service_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(resolve::routes())
        .merge(catalog::routes())
        .merge(requests::routes())
}
