//! Governance request routes.
//!
//! ## Routes
//!
//! - `POST /requests` - Submit a request for a new path (submit token)
//! - `GET  /requests?status=` - List requests with per-status counts
//! - `GET  /requests/{id}` - Get one request
//! - `POST /requests/{id}/approve` - Approve (approve token)
//! - `POST /requests/{id}/reject` - Reject (approve token)
//! - `POST /requests/{id}/comments` - Add a review comment (submit token)

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use moniker_catalog::{Ownership, SourceType, SubmitRequest};
use serde::Deserialize;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::server::AppState;

/// Body of `POST /requests`.
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    /// Target path.
    pub path: String,
    /// Proposed display name.
    #[serde(default)]
    pub display_name: String,
    /// Proposed description.
    #[serde(default)]
    pub description: String,
    /// Why the path is needed.
    #[serde(default)]
    pub justification: String,
    /// Requester; defaults to the caller.
    pub requester: Option<String>,
    /// Proposed ownership.
    #[serde(default)]
    pub ownership: Ownership,
    /// Proposed source type.
    pub source_type: Option<SourceType>,
    /// Proposed tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Body of approve and reject.
#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    /// Required reason.
    #[serde(default)]
    pub reason: String,
    /// Reviewer; defaults to the caller.
    pub actor: Option<String>,
}

/// Body of `POST /requests/{id}/comments`.
#[derive(Debug, Deserialize)]
pub struct CommentBody {
    /// Comment text.
    pub content: String,
    /// Author; defaults to the caller.
    pub author: Option<String>,
}

/// Query parameters for listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Status filter, e.g. `pending_review`.
    pub status: Option<String>,
}

/// Creates request routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(submit).get(list_requests))
        .route("/requests/{id}", get(get_request))
        .route("/requests/{id}/approve", post(approve))
        .route("/requests/{id}/reject", post(reject))
        .route("/requests/{id}/comments", post(add_comment))
}

fn or_caller(ctx: &RequestContext, explicit: Option<String>) -> String {
    explicit
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| ctx.caller.principal().to_string())
}

/// Submit a request.
///
/// POST /requests
pub(crate) async fn submit(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError> {
    let requester = or_caller(&ctx, body.requester);
    tracing::info!(path = %body.path, requester = %requester, "Submitting moniker request");
    let request = state
        .service
        .submit(
            ctx.token(),
            SubmitRequest {
                path: body.path,
                display_name: body.display_name,
                description: body.description,
                justification: body.justification,
                requester,
                ownership: body.ownership,
                source_type: body.source_type,
                tags: body.tags,
            },
        )
        .map_err(|e| ctx.error(e))?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// List requests.
///
/// GET /requests
pub(crate) async fn list_requests(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .service
        .list_requests(params.status.as_deref())
        .map_err(|e| ctx.error(e))?;
    Ok(Json(listing))
}

/// Get one request.
///
/// GET /requests/{id}
pub(crate) async fn get_request(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.service.get_request(&id).map_err(|e| ctx.error(e))?;
    Ok(Json(request))
}

/// Approve a request.
///
/// POST /requests/{id}/approve
pub(crate) async fn approve(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = or_caller(&ctx, body.actor);
    tracing::info!(request_id = %id, actor = %actor, "Approving moniker request");
    let request = state
        .service
        .approve(ctx.token(), &id, &actor, &body.reason)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(request))
}

/// Reject a request.
///
/// POST /requests/{id}/reject
pub(crate) async fn reject(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = or_caller(&ctx, body.actor);
    tracing::info!(request_id = %id, actor = %actor, "Rejecting moniker request");
    let request = state
        .service
        .reject(ctx.token(), &id, &actor, &body.reason)
        .map_err(|e| ctx.error(e))?;
    Ok(Json(request))
}

pub(crate) async fn add_comment(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let author = or_caller(&ctx, body.author);
    let request = state
        .service
        .add_comment(ctx.token(), &id, &author, &body.content)
        .map_err(|e| ctx.error(e))?;
    Ok((StatusCode::CREATED, Json(request)))
}
