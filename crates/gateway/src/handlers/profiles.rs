//! Staff profile handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::AppState;
use civica_common::{
    auth::AuthContext,
    errors::{AppError, Result},
    models::Profile,
};

/// Fetch a profile by email. Profiles back the public staff directory.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Profile>> {
    let profile = state.access.get_profile(&email).await?;
    Ok(Json(profile))
}

/// Create or replace a profile. Callers may only edit their own unless
/// they hold the admin scope.
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(email): Path<String>,
    Json(profile): Json<Profile>,
) -> Result<Json<Profile>> {
    if !auth.is_admin() && auth.email != email {
        return Err(AppError::Forbidden {
            message: "cannot edit another user's profile".into(),
        });
    }

    let updated = state.access.update_profile(&email, profile).await?;
    Ok(Json(updated))
}
