//! Chat endpoints: SSE streaming, the non-streaming variant, tool-call
//! confirmation, and history access.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::assistant::{ChatResponse, TakeError};
use crate::core::errors::AppError;
use crate::llm::ChatMessage;

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Buffered events between the session task and the SSE writer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Chat request body, shared by the streaming and non-streaming routes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Client-held prior turns, oldest first.
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

/// Confirmation request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Id of the pending tool call.
    pub tool_call_id: String,
    /// Whether to execute it.
    pub approved: bool,
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Maximum number of turns to return.
    pub limit: Option<usize>,
}

fn validate_message(message: &str, state: &AppState) -> ApiResult<()> {
    if message.trim().is_empty() {
        return Err(ApiError::Validation("Message cannot be empty".to_string()));
    }
    let max = state.config.chat.message_max_chars;
    if message.chars().count() > max {
        return Err(ApiError::Validation(format!(
            "Message must be at most {max} characters long"
        )));
    }
    Ok(())
}

fn upstream_error(e: AppError) -> ApiError {
    match e {
        AppError::Upstream(msg) => ApiError::Upstream(msg),
        AppError::HttpClient(e) => ApiError::Upstream(e.to_string()),
        AppError::Serialization(e) => {
            ApiError::Upstream(format!("model returned malformed output: {e}"))
        }
        other => ApiError::Internal(other),
    }
}

/// `POST /api/chat/stream`
pub async fn stream_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    validate_message(&request.message, &state)?;

    let context = state
        .prompt
        .build(&request.conversation_history, &request.message);

    // The session persists the user turn and emits `start` before the
    // upstream request is made; an open failure arrives as an in-band
    // `error` event rather than an HTTP status.
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let owner = user.id;
    let message = request.message;
    tokio::spawn(async move {
        let open = state.llm.stream(&context, state.registry.specs());
        state.session.run(owner, &message, open, tx).await;
    });

    let events = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `POST /api/chat/message`
pub async fn chat_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    validate_message(&request.message, &state)?;

    let context = state
        .prompt
        .build(&request.conversation_history, &request.message);
    let assistant = state
        .llm
        .complete(&context, state.registry.specs())
        .await
        .map_err(upstream_error)?;

    let response = state
        .session
        .complete_turn(user.id, &request.message, assistant)
        .await
        .map_err(upstream_error)?;
    Ok(Json(response))
}

/// `POST /api/chat/confirm`
pub async fn confirm_tool_call(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<ConfirmRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let call = state
        .pending
        .take(&request.tool_call_id, user.id)
        .map_err(|e| match e {
            TakeError::NotFound => {
                ApiError::Validation("Tool call not found or expired".to_string())
            }
            TakeError::Expired => ApiError::Validation("Tool call expired".to_string()),
        })?;

    if !request.approved {
        state.session.discard_rejected(user.id, &call).await?;
        return Ok(Json(json!({
            "success": true,
            "message": "Okay, I won't do that. Let me know if you need anything else! 😺",
        })));
    }

    let response = state.session.execute_confirmed(user.id, call).await?;
    Ok(Json(serde_json::to_value(response).map_err(AppError::from)?))
}

/// `GET /api/chat/history`
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = params
        .limit
        .unwrap_or(state.config.chat.history_fetch_default);
    let turns = state.storage.turns().recent(user.id, limit).await?;
    Ok(Json(json!({"success": true, "data": turns})))
}

/// `DELETE /api/chat/history`
pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let removed = state.storage.turns().clear(user.id).await?;
    tracing::info!(owner = %user.id, removed, "chat history cleared");
    Ok(Json(json!({
        "success": true,
        "message": "Chat history cleared! Starting fresh! 🐾",
    })))
}
