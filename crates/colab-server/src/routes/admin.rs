//! Admin console endpoints, all gated on the application admin role.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use colab_proto::{UserRole, time::now_ms};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::RequireAdmin;

const MONTH_MS: u64 = 30 * 24 * 60 * 60 * 1000;
const WEEK_MS: u64 = 7 * 24 * 60 * 60 * 1000;

pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<serde_json::Value>, ApiError> {
    let users: Vec<_> = state
        .db
        .list_users()?
        .into_iter()
        .map(|user| user.into_view())
        .collect();
    Ok(Json(json!({ "success": true, "users": users })))
}

#[derive(Deserialize)]
pub struct UpdateUserBody {
    role: Option<UserRole>,
}

pub async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateUserBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(role) = body.role {
        if admin.id == user_id && role != UserRole::Admin {
            return Err(ApiError::bad_request("Cannot demote your own account"));
        }
        state.db.set_user_role(&user_id, role)?;
        info!(user_id = %user_id, role = role.as_str(), "role changed");
    }
    let user = state
        .db
        .user_by_id(&user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({ "success": true, "user": user.into_view() })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if admin.id == user_id {
        return Err(ApiError::bad_request("Cannot delete your own account"));
    }
    state.db.delete_sessions_for_user(&user_id)?;
    state.db.delete_user(&user_id)?;
    info!(user_id = %user_id, "user deleted");
    Ok(Json(json!({ "success": true, "message": "User deleted" })))
}

pub async fn list_projects(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<serde_json::Value>, ApiError> {
    let projects = state.db.all_projects()?;
    Ok(Json(json!({ "success": true, "projects": projects })))
}

pub async fn stats(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = now_ms();
    let stats = state
        .db
        .admin_stats(now.saturating_sub(MONTH_MS), now.saturating_sub(WEEK_MS))?;
    Ok(Json(json!({ "success": true, "stats": stats.to_json() })))
}
