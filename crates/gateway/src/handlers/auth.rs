//! Login, access-request, and PIN verification handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use civica_common::{
    auth::{validate_password, SCOPE_ADMIN, SCOPE_EMPLOYEE},
    errors::{AppError, Result},
    models::AccessRequest,
};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Admin login. Credentials come from configuration (hashed) or, in
/// bootstrap mode, from the explicit bootstrap password.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let auth_config = &state.config.auth;
    let bootstrap_match = state
        .verifier
        .bootstrap()
        .admin_password_matches(&request.password);
    let stored_match = auth_config
        .admin_password_hash
        .as_deref()
        .is_some_and(|hash| validate_password(&request.password, hash));

    if request.email != auth_config.admin_email || !(bootstrap_match || stored_match) {
        return Err(AppError::InvalidCredentials);
    }

    if bootstrap_match {
        tracing::warn!("Admin login via bootstrap password");
    }
    let token = state
        .verifier
        .issue_token(&request.email, vec![SCOPE_ADMIN.to_string()])?;

    tracing::info!(email = %request.email, "Admin logged in");
    Ok(Json(TokenResponse { token }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RequestAccessRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[serde(default)]
    pub department: String,

    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

/// File a portal access request
pub async fn request_access(
    State(state): State<AppState>,
    Json(request): Json<RequestAccessRequest>,
) -> Result<(StatusCode, Json<AccessRequest>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let record = state
        .access
        .request(
            &request.name,
            &request.email,
            &request.department,
            &request.reason,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPinRequest {
    pub pin: String,
}

#[derive(Serialize)]
pub struct VerifyPinResponse {
    pub token: String,
    pub email: String,
}

/// Exchange an approved PIN for an employee token
pub async fn verify_pin(
    State(state): State<AppState>,
    Json(request): Json<VerifyPinRequest>,
) -> Result<Json<VerifyPinResponse>> {
    let email = state.access.verify_pin(&request.pin).await?;
    let token = state
        .verifier
        .issue_token(&email, vec![SCOPE_EMPLOYEE.to_string()])?;

    Ok(Json(VerifyPinResponse { token, email }))
}
