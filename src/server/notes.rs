//! Owner-scoped note CRUD handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::core::ids::NoteId;
use crate::core::models::Note;

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use super::state::AppState;

fn validate_title(title: &str, state: &AppState) -> ApiResult<String> {
    let title = title.trim();
    let limits = &state.config.limits;
    if title.chars().count() < limits.note_title_min {
        return Err(ApiError::Validation(format!(
            "Note title must be at least {} characters long",
            limits.note_title_min
        )));
    }
    if title.chars().count() > limits.note_title_max {
        return Err(ApiError::Validation(format!(
            "Note title must be at most {} characters long",
            limits.note_title_max
        )));
    }
    Ok(title.to_string())
}

fn validate_content(content: &str, state: &AppState) -> ApiResult<String> {
    let content = content.trim();
    let limits = &state.config.limits;
    if content.chars().count() < limits.note_content_min {
        return Err(ApiError::Validation("Note content cannot be empty".to_string()));
    }
    if content.chars().count() > limits.note_content_max {
        return Err(ApiError::Validation(format!(
            "Note content must be at most {} characters long",
            limits.note_content_max
        )));
    }
    Ok(content.to_string())
}

/// Note creation body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    /// Note title.
    pub title: String,
    /// Note body.
    pub content: String,
}

/// Note update body; absent fields keep their current value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoteRequest {
    /// New title.
    pub title: Option<String>,
    /// New body.
    pub content: Option<String>,
}

/// `GET /api/notes`
pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Note>>> {
    Ok(Json(state.storage.notes().list(user.id).await?))
}

/// `POST /api/notes`
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CreateNoteRequest>,
) -> ApiResult<(StatusCode, Json<Note>)> {
    let title = validate_title(&request.title, &state)?;
    let content = validate_content(&request.content, &state)?;

    let note = Note::new(user.id, title, content);
    state.storage.notes().insert(&note).await?;
    tracing::info!(owner = %user.id, note = %note.id, "note created");
    Ok((StatusCode::CREATED, Json(note)))
}

/// `PUT /api/notes/{id}`
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<NoteId>,
    Json(request): Json<UpdateNoteRequest>,
) -> ApiResult<Json<Note>> {
    let mut note = state
        .storage
        .notes()
        .get(id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Note not found".to_string()))?;

    if let Some(title) = &request.title {
        note.title = validate_title(title, &state)?;
    }
    if let Some(content) = &request.content {
        note.content = validate_content(content, &state)?;
    }
    note.updated_at = chrono::Utc::now();

    state.storage.notes().update(&note).await?;
    Ok(Json(note))
}

/// `DELETE /api/notes/{id}`
pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<NoteId>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.storage.notes().delete(id, user.id).await? {
        return Err(ApiError::NotFound("Note not found".to_string()));
    }
    tracing::info!(owner = %user.id, note = %id, "note deleted");
    Ok(Json(json!({"success": true, "message": "Note deleted"})))
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
    async fn note_title_bounds_are_enforced() {
        let state = state().await;
        assert!(validate_title("A", &state).is_err());
        assert!(validate_title("AB", &state).is_ok());
        assert!(validate_title(&"x".repeat(151), &state).is_err());
    }

    #[tokio::test]
    async fn whitespace_only_content_is_rejected() {
        let state = state().await;
        assert!(validate_content("   ", &state).is_err());
        assert!(validate_content(" x ", &state).is_ok());
    }
}
