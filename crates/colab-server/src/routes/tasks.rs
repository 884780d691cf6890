//! Task CRUD. Every successful mutation feeds the realtime broadcaster:
//! `task_moved` when the board column changed, `task_updated` otherwise.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use colab_proto::{TaskPriority, TaskStatus};
use colab_store::tasks::TaskPatch;

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
    let tasks = state.db.tasks_for_project(&project_id)?;
    Ok(Json(json!({ "success": true, "tasks": tasks })))
}

#[derive(Deserialize)]
pub struct CreateTaskBody {
    #[serde(default)]
    title: String,
    description: Option<String>,
    status: Option<TaskStatus>,
    priority: Option<TaskPriority>,
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
    Json(body): Json<CreateTaskBody>,
) -> Result<Response, ApiError> {
    require_member(&state, &project_id, &user.id)?;

    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("Task title is required"));
    }

    let task = state.db.create_task(
        &project_id,
        &user.id,
        title,
        body.description.as_deref().map(str::trim).filter(|d| !d.is_empty()),
        body.status,
        body.priority,
    )?;
    info!(task_id = %task.id, project_id = %project_id, "task created");

    let payload = serde_json::to_value(&task).unwrap_or_default();
    state.broadcaster.publish_task_created(&project_id, &user.id, payload);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "task": task })),
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct UpdateTaskBody {
    title: Option<String>,
    description: Option<String>,
    status: Option<TaskStatus>,
    priority: Option<TaskPriority>,
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((project_id, task_id)): Path<(String, String)>,
    Json(body): Json<UpdateTaskBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_member(&state, &project_id, &user.id)?;

    let existing = state
        .db
        .task_in_project(&project_id, &task_id)?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    if let Some(title) = &body.title {
        if title.trim().is_empty() {
            return Err(ApiError::bad_request("Task title cannot be empty"));
        }
    }

    let status_changed = body.status.is_some_and(|status| status != existing.status);

    let task = state.db.update_task(
        &project_id,
        &task_id,
        TaskPatch {
            title: body.title.as_deref().map(str::trim).map(str::to_string),
            description: body.description,
            status: body.status,
            priority: body.priority,
        },
    )?;

    let payload = serde_json::to_value(&task).unwrap_or_default();
    if status_changed {
        state.broadcaster.publish_task_moved(&project_id, &user.id, payload);
    } else {
        state.broadcaster.publish_task_updated(&project_id, &user.id, payload);
    }

    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((project_id, task_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_member(&state, &project_id, &user.id)?;

    match state.db.delete_task(&project_id, &task_id) {
        Ok(()) => {}
        Err(colab_store::StoreError::NotFound) => {
            return Err(ApiError::not_found("Task not found"));
        }
        Err(other) => return Err(other.into()),
    }
    info!(task_id = %task_id, project_id = %project_id, "task deleted");

    state.broadcaster.publish_task_deleted(&project_id, &user.id, &task_id);

    Ok(Json(json!({ "success": true, "message": "Task deleted successfully" })))
}
