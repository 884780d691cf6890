//! The authenticated user's own profile.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;

pub async fn get_profile(
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "success": true, "user": user.into_view() })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileBody {
    name: Option<String>,
    contact_number: Option<String>,
    profile_picture_url: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<UpdateProfileBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation(&["name_required"]));
        }
    }

    let updated = state.db.update_profile(
        &user.id,
        body.name.as_deref().map(str::trim),
        body.contact_number.as_deref().map(str::trim),
        body.profile_picture_url.as_deref(),
    )?;
    Ok(Json(json!({ "success": true, "user": updated.into_view() })))
}
