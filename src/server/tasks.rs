//! Owner-scoped task CRUD handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::core::ids::TaskId;
use crate::core::models::{Task, TaskStatus};

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use super::state::AppState;

fn validate_title(title: &str, state: &AppState) -> ApiResult<String> {
    let title = title.trim();
    let limits = &state.config.limits;
    if title.chars().count() < limits.task_title_min {
        return Err(ApiError::Validation(format!(
            "Task title must be at least {} characters long",
            limits.task_title_min
        )));
    }
    if title.chars().count() > limits.task_title_max {
        return Err(ApiError::Validation(format!(
            "Task title must be at most {} characters long",
            limits.task_title_max
        )));
    }
    Ok(title.to_string())
}

fn validate_description(description: &str, state: &AppState) -> ApiResult<String> {
    let description = description.trim();
    let limits = &state.config.limits;
    if description.chars().count() < limits.task_description_min {
        return Err(ApiError::Validation(format!(
            "Task description must be at least {} characters long",
            limits.task_description_min
        )));
    }
    if description.chars().count() > limits.task_description_max {
        return Err(ApiError::Validation(format!(
            "Task description must be at most {} characters long",
            limits.task_description_max
        )));
    }
    Ok(description.to_string())
}

/// Task creation body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Initial status; defaults to not started.
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

/// Task update body; absent fields keep their current value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<TaskStatus>,
}

/// `GET /api/tasks`
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(state.storage.tasks().list(user.id).await?))
}

/// `POST /api/tasks`
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let title = validate_title(&request.title, &state)?;
    let description = validate_description(&request.description, &state)?;

    let task = Task::new(user.id, title, description, request.status.unwrap_or_default());
    state.storage.tasks().insert(&task).await?;
    tracing::info!(owner = %user.id, task = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// `PUT /api/tasks/{id}`
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<TaskId>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let mut task = state
        .storage
        .tasks()
        .get(id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    if let Some(title) = &request.title {
        task.title = validate_title(title, &state)?;
    }
    if let Some(description) = &request.description {
        task.description = validate_description(description, &state)?;
    }
    if let Some(status) = request.status {
        task.status = status;
    }
    task.updated_at = chrono::Utc::now();

    state.storage.tasks().update(&task).await?;
    Ok(Json(task))
}

/// `DELETE /api/tasks/{id}`
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.storage.tasks().delete(id, user.id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    tracing::info!(owner = %user.id, task = %id, "task deleted");
    Ok(Json(json!({"success": true, "message": "Task deleted"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::storage::Storage;

    async fn state() -> Arc<AppState> {
        let storage = Storage::open_in_memory().await.unwrap();
        AppState::new(AppConfig::default(), storage).unwrap()
    }

    #[tokio::test]
    async fn title_bounds_are_enforced() {
        let state = state().await;
        assert!(validate_title("AB", &state).is_err());
        assert!(validate_title("  ABC  ", &state).is_ok());
        assert!(validate_title(&"x".repeat(201), &state).is_err());
    }

    #[tokio::test]
    async fn validated_title_is_trimmed() {
        let state = state().await;
        assert_eq!(validate_title("  Groceries  ", &state).unwrap(), "Groceries");
    }

    #[tokio::test]
    async fn description_bounds_are_enforced() {
        let state = state().await;
        assert!(validate_description("abcd", &state).is_err());
        assert!(validate_description("abcde", &state).is_ok());
        assert!(validate_description(&"x".repeat(1001), &state).is_err());
    }
}
