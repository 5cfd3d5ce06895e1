//! Paper submission and listing handlers

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use civica_common::{
    auth::{AuthContext, MaybeAuth},
    errors::{AppError, Result},
    models::{Paper, PaperStatus},
};

/// Paper as rendered to clients. The URL is recomputed from the current
/// public base address on every read and is never persisted.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub author: String,
    pub date: String,
    pub status: PaperStatus,
    pub file_name: String,
    pub url: String,
}

pub(crate) fn paper_response(state: &AppState, paper: Paper) -> PaperResponse {
    let url = state.papers.url_for(&paper);
    PaperResponse {
        id: paper.id,
        title: paper.title,
        description: paper.description,
        category: paper.category,
        abstract_text: paper.abstract_text,
        author: paper.author,
        date: paper.date.to_rfc3339(),
        status: paper.status,
        file_name: paper.file_name,
        url,
    }
}

/// Submit a paper: multipart form with metadata fields plus the file
pub async fn upload_paper(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PaperResponse>)> {
    let mut title = String::new();
    let mut description = String::new();
    let mut category = String::new();
    let mut abstract_text = String::new();
    let mut author = auth.email.clone();
    let mut file_name = String::new();
    let mut file_bytes: Vec<u8> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = field.text().await.map_err(bad_multipart)?,
            "description" => description = field.text().await.map_err(bad_multipart)?,
            "category" => category = field.text().await.map_err(bad_multipart)?,
            "abstract" => abstract_text = field.text().await.map_err(bad_multipart)?,
            "author" => author = field.text().await.map_err(bad_multipart)?,
            "file" => {
                file_name = field.file_name().unwrap_or("upload").to_string();
                file_bytes = field.bytes().await.map_err(bad_multipart)?.to_vec();
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    let paper = state
        .papers
        .submit(
            &author,
            civica_common::papers::PaperDraft {
                title,
                description,
                category,
                abstract_text,
            },
            &file_name,
            &file_bytes,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(paper_response(&state, paper))))
}

/// Public list of approved papers
pub async fn list_papers(State(state): State<AppState>) -> Result<Json<Vec<PaperResponse>>> {
    let papers = state.papers.list_public().await?;
    Ok(Json(
        papers
            .into_iter()
            .map(|p| paper_response(&state, p))
            .collect(),
    ))
}

/// Single paper; unapproved papers are only visible to admins and their
/// existence is hidden from everyone else.
pub async fn get_paper(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Path(id): Path<String>,
) -> Result<Json<PaperResponse>> {
    let admin = auth.map(|ctx| ctx.is_admin()).unwrap_or(false);
    let paper = state.papers.get(&id, admin).await?;
    Ok(Json(paper_response(&state, paper)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Apply a status transition (admin only)
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<PaperResponse>> {
    auth.require_scope(civica_common::auth::SCOPE_ADMIN)?;

    let status = match request.status.as_str() {
        "pending" => PaperStatus::Pending,
        "approved" => PaperStatus::Approved,
        "rejected" => PaperStatus::Rejected,
        other => {
            return Err(AppError::Validation {
                message: format!("unknown status: {other}"),
                field: Some("status".into()),
            })
        }
    };

    let paper = state.papers.set_status(&id, status, &auth.email).await?;
    Ok(Json(paper_response(&state, paper)))
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation {
        message: format!("malformed multipart body: {err}"),
        field: None,
    }
}
