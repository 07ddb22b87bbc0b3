//! Catalog browsing and curation routes.
//!
//! ## Routes
//!
//! - `GET /catalog/search?q=&status=&limit=` - Substring search
//! - `GET /catalog/stats` - Counts by status and source type
//! - `GET /catalog/tree?root=&depth=` - Nested subtree
//! - `GET /catalog/audit?path=&limit=` - Audit log, oldest first
//! - `GET /catalog/cache` - Cached query status
//! - `PUT /catalog/status` - Set a node's lifecycle status (approve token)
//! - `PUT /catalog/ownership` - Patch a node's ownership (approve token)
//! - `PUT /catalog/metadata` - Patch a node's metadata (approve token)

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use moniker_catalog::{NodePatch, OwnershipPatch};
use serde::Deserialize;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::server::AppState;

/// Results returned by a search without `limit`.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Depth of a tree request without `depth`.
pub const DEFAULT_TREE_DEPTH: usize = 5;

/// Query parameters for search.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Case-insensitive search text.
    #[serde(default)]
    pub q: String,
    /// Restricts results to one lifecycle status.
    pub status: Option<String>,
    /// Maximum results.
    pub limit: Option<usize>,
}

/// Query parameters for the tree view.
#[derive(Debug, Deserialize)]
pub struct TreeParams {
    /// Subtree root; empty for the whole catalog.
    #[serde(default)]
    pub root: String,
    /// Maximum depth below the root.
    pub depth: Option<usize>,
}

/// Query parameters for the audit log.
#[derive(Debug, Deserialize)]
pub struct AuditParams {
    /// Restrict to one path.
    pub path: Option<String>,
    /// Maximum entries.
    pub limit: Option<usize>,
}

/// Body of `PUT /catalog/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// Node path.
    pub path: String,
    /// New status name.
    pub status: String,
    /// Actor recorded in the audit log; defaults to the caller.
    pub actor: Option<String>,
}

/// Body of `PUT /catalog/ownership`.
#[derive(Debug, Deserialize)]
pub struct UpdateOwnershipRequest {
    /// Node path.
    pub path: String,
    /// Role values to set; an empty value clears the role.
    pub ownership: OwnershipPatch,
    /// Actor recorded in the audit log; defaults to the caller.
    pub actor: Option<String>,
}

/// Body of `PUT /catalog/metadata`.
#[derive(Debug, Deserialize)]
pub struct UpdateMetadataRequest {
    /// Node path.
    pub path: String,
    /// Fields to change.
    pub metadata: NodePatch,
    /// Actor recorded in the audit log; defaults to the caller.
    pub actor: Option<String>,
}

/// Creates catalog routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/catalog/search", get(search))
        .route("/catalog/stats", get(stats))
        .route("/catalog/tree", get(tree))
        .route("/catalog/audit", get(audit))
        .route("/catalog/cache", get(cache_status))
        .route("/catalog/status", put(update_status))
        .route("/catalog/ownership", put(update_ownership))
        .route("/catalog/metadata", put(update_metadata))
}

fn actor(ctx: &RequestContext, explicit: Option<String>) -> String {
    explicit
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| ctx.caller.principal().to_string())
}

pub(crate) async fn search(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let nodes = state
        .service
        .search(&params.q, params.status.as_deref(), limit)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(nodes))
}

pub(crate) async fn stats(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.service.stats().map_err(|e| ctx.error(e))?;
    Ok(Json(stats))
}

pub(crate) async fn tree(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(params): Query<TreeParams>,
) -> Result<impl IntoResponse, ApiError> {
    let depth = params.depth.unwrap_or(DEFAULT_TREE_DEPTH);
    let tree = state
        .service
        .tree(&params.root, depth)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(tree))
}

pub(crate) async fn audit(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditParams>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .service
        .audit_log(params.path.as_deref(), params.limit)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(entries))
}

pub(crate) async fn cache_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.cache_status())
}

/// Set a node's lifecycle status.
///
/// PUT /catalog/status
pub(crate) async fn update_status(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor(&ctx, req.actor);
    tracing::info!(path = %req.path, status = %req.status, actor = %actor, "Updating node status");
    let node = state
        .service
        .update_node_status(ctx.token(), &req.path, &req.status, &actor)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(node))
}

/// Patch a node's ownership.
///
/// PUT /catalog/ownership
pub(crate) async fn update_ownership(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateOwnershipRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor(&ctx, req.actor);
    tracing::info!(path = %req.path, actor = %actor, "Updating node ownership");
    let node = state
        .service
        .update_ownership(ctx.token(), &req.path, &req.ownership, &actor)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(node))
}

/// Patch a node's metadata.
///
/// PUT /catalog/metadata
pub(crate) async fn update_metadata(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateMetadataRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = actor(&ctx, req.actor);
    tracing::info!(path = %req.path, actor = %actor, "Updating node metadata");
    let node = state
        .service
        .update_metadata(ctx.token(), &req.path, &req.metadata, &actor)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(node))
}
