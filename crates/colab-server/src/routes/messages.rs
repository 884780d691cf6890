//! Project chat endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;

fn require_member(state: &AppState, project_id: &str, user_id: &str) -> Result<(), ApiError> {
    if state.db.is_project_member(project_id, user_id)? {
        Ok(())
    } else {
        Err(ApiError::not_found("Project not found or access denied"))
    }
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_member(&state, &project_id, &user.id)?;
    let messages = state.db.messages_for_project(&project_id)?;
    Ok(Json(json!({ "success": true, "messages": messages })))
}

#[derive(Deserialize)]
pub struct CreateMessageBody {
    #[serde(default)]
    body: String,
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
    Json(body): Json<CreateMessageBody>,
) -> Result<Response, ApiError> {
    require_member(&state, &project_id, &user.id)?;

    let text = body.body.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("Message body is required"));
    }

    let message = state.db.create_message(&project_id, &user.id, text)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": message })),
    )
        .into_response())
}
