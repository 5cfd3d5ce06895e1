//! Admin handlers: access-request review and the full paper listing

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::handlers::papers::{paper_response, PaperResponse};
use crate::AppState;
use civica_common::{
    auth::{AuthContext, SCOPE_ADMIN},
    errors::Result,
    models::AccessRequest,
};

/// List all access requests
pub async fn list_access_requests(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<AccessRequest>>> {
    auth.require_scope(SCOPE_ADMIN)?;
    let requests = state.access.list_for_admin().await?;
    Ok(Json(requests))
}

/// Approve a request: mints the PIN, persists, dispatches the mail
pub async fn approve_request(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<Json<AccessRequest>> {
    auth.require_scope(SCOPE_ADMIN)?;
    let approved = state.access.approve(&id).await?;
    tracing::info!(request_id = %id, actor = %auth.email, "Access request approved by admin");
    Ok(Json(approved))
}

/// Full paper list including non-approved submissions
pub async fn list_all_papers(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<PaperResponse>>> {
    auth.require_scope(SCOPE_ADMIN)?;
    let papers = state.papers.list_for_admin().await?;
    Ok(Json(
        papers
            .into_iter()
            .map(|p| paper_response(&state, p))
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct TruncateRequest {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Serialize)]
pub struct TruncateResponse {
    pub removed: usize,
}

/// Destructive maintenance: drop every paper record. Requires an explicit
/// `confirm: true` in the body.
pub async fn truncate_papers(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<TruncateRequest>,
) -> Result<Json<TruncateResponse>> {
    auth.require_scope(SCOPE_ADMIN)?;
    let removed = state.papers.truncate(request.confirm).await?;
    tracing::warn!(actor = %auth.email, removed = removed, "Papers truncated by admin");
    Ok(Json(TruncateResponse { removed }))
}
