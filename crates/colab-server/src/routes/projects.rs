//! Project CRUD and membership management.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use colab_proto::{ProjectRole, UserRole};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::mailer::project_invite_mail;

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let projects = state.db.projects_for_user(&user.id)?;
    Ok(Json(json!({ "success": true, "projects": projects })))
}

#[derive(Deserialize)]
pub struct CreateProjectBody {
    #[serde(default)]
    name: String,
    description: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CreateProjectBody>,
) -> Result<Response, ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Project name is required"));
    }

    let description = body.description.as_deref().map(str::trim).filter(|d| !d.is_empty());
    let project = state.db.create_project(name, description, &user.id)?;
    info!(project_id = %project.id, user_id = %user.id, "project created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "project": project })),
    )
        .into_response())
}

/// Membership gate shared by every project-scoped handler.
fn require_member(state: &AppState, project_id: &str, user_id: &str) -> Result<(), ApiError> {
    if state.db.is_project_member(project_id, user_id)? {
        Ok(())
    } else {
        Err(ApiError::not_found("Project not found or access denied"))
    }
}

fn require_owner(
    state: &AppState,
    project_id: &str,
    user: &colab_store::UserRecord,
) -> Result<(), ApiError> {
    if user.role == UserRole::Admin {
        return Ok(());
    }
    match state.db.member_role(project_id, &user.id)? {
        Some(ProjectRole::Owner) => Ok(()),
        Some(_) => Err(ApiError::forbidden()),
        None => Err(ApiError::not_found("Project not found or access denied")),
    }
}

pub async fn get_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_member(&state, &project_id, &user.id)?;
    let project = state
        .db
        .project_by_id(&project_id)?
        .ok_or_else(|| ApiError::not_found("Project not found or access denied"))?;
    Ok(Json(json!({ "success": true, "project": project })))
}

#[derive(Deserialize)]
pub struct UpdateProjectBody {
    name: Option<String>,
    description: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
    Json(body): Json<UpdateProjectBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_owner(&state, &project_id, &user)?;

    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("Project name is required"));
        }
    }
    let project = state.db.update_project(
        &project_id,
        body.name.as_deref().map(str::trim),
        body.description.as_deref().map(str::trim),
    )?;
    Ok(Json(json!({ "success": true, "project": project })))
}

pub async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_owner(&state, &project_id, &user)?;
    state.db.delete_project(&project_id)?;
    info!(project_id = %project_id, user_id = %user.id, "project deleted");
    Ok(Json(json!({ "success": true, "message": "Project deleted successfully" })))
}

pub async fn list_members(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_member(&state, &project_id, &user.id)?;
    let members = state.db.list_members(&project_id)?;
    Ok(Json(json!({ "success": true, "members": members })))
}

#[derive(Deserialize)]
pub struct AddMemberBody {
    #[serde(default)]
    email: String,
    role: Option<ProjectRole>,
}

pub async fn add_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
    Json(body): Json<AddMemberBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.email.is_empty() {
        return Err(ApiError::bad_request("User email is required"));
    }

    let project = state
        .db
        .project_by_id(&project_id)?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    require_owner(&state, &project_id, &user)?;

    let role = body.role.unwrap_or(ProjectRole::Editor);
    if role == ProjectRole::Owner {
        return Err(ApiError::bad_request("Cannot grant the owner role"));
    }

    let (target, setup_token) = match state.db.user_by_email(&body.email)? {
        Some(existing) => (existing, None),
        None => {
            // Unregistered address: create a placeholder account the
            // invitee completes through the setup flow.
            let invite_token = uuid::Uuid::new_v4().to_string();
            let invited = state.db.create_invited_user(&body.email, &invite_token)?;
            (invited, Some(invite_token))
        }
    };

    state.db.add_member(&project_id, &target.id, role)?;
    state.mailer.send(project_invite_mail(
        &user.name,
        &project.name,
        &body.email,
        &state.config.origin,
        setup_token.as_deref(),
        &project_id,
    ));
    info!(project_id = %project_id, member = %target.id, role = role.as_str(), "member added");

    Ok(Json(json!({
        "success": true,
        "message": "User added to project and notified via email",
    })))
}

pub async fn remove_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((project_id, member_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_owner(&state, &project_id, &user)?;

    if state.db.member_role(&project_id, &member_id)? == Some(ProjectRole::Owner) {
        return Err(ApiError::bad_request("Cannot remove the project owner"));
    }
    state.db.remove_member(&project_id, &member_id)?;
    Ok(Json(json!({ "success": true, "message": "Member removed" })))
}
