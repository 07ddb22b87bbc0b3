//! Moniker resolution routes.
//!
//! ## Routes
//!
//! - `GET /resolve/{*moniker}` - Resolve a moniker to its source binding
//! - `GET /fetch/{*moniker}` - Resolve and return data
//! - `GET /describe/{*path}` - Node metadata and ownership
//! - `GET /list` and `GET /list/{*path}` - Direct children
//! - `GET /lineage/{*path}` - Ownership provenance per ancestor
//!
//! A moniker's query parameters travel as the URL query string.

use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::server::AppState;

/// Creates resolution routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/resolve/{*moniker}", get(resolve))
        .route("/fetch/{*moniker}", get(fetch))
        .route("/describe/{*path}", get(describe))
        .route("/list", get(list_root))
        .route("/list/{*path}", get(list_children))
        .route("/lineage/{*path}", get(lineage))
}

fn moniker_text(moniker: &str, query: Option<String>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{moniker}?{query}"),
        None => moniker.to_string(),
    }
}

/// Resolve a moniker.
///
/// GET /resolve/{*moniker}
pub(crate) async fn resolve(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(moniker): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, ApiError> {
    let moniker = moniker_text(&moniker, query);
    let result = state
        .service
        .resolve(&moniker, &ctx.caller)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(result))
}

/// Resolve and fetch data.
///
/// GET /fetch/{*moniker}
pub(crate) async fn fetch(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(moniker): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, ApiError> {
    let moniker = moniker_text(&moniker, query);
    let result = state
        .service
        .fetch(&moniker, &ctx.caller)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(result))
}

/// Describe a catalog node.
///
/// GET /describe/{*path}
pub(crate) async fn describe(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.service.describe(&path).map_err(|e| ctx.error(e))?;
    Ok(Json(result))
}

pub(crate) async fn list_root(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.service.list_children("").map_err(|e| ctx.error(e))?;
    Ok(Json(result))
}

/// List direct children.
///
/// GET /list/{*path}
pub(crate) async fn list_children(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .service
        .list_children(&path)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(result))
}

/// Ownership lineage.
///
/// GET /lineage/{*path}
pub(crate) async fn lineage(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.service.lineage(&path).map_err(|e| ctx.error(e))?;
    Ok(Json(result))
}
