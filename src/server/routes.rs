//! Route table and per-IP rate-limit middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use super::error::ApiError;
use super::state::AppState;
use super::{auth, chat, notes, tasks};

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_rate_limit,
        ));

    let api_routes = Router::new()
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/{id}",
            put(tasks::update_task).delete(tasks::delete_task),
        )
        .route("/notes", get(notes::list_notes).post(notes::create_note))
        .route(
            "/notes/{id}",
            put(notes::update_note).delete(notes::delete_note),
        )
        .route("/chat/stream", post(chat::stream_chat))
        .route("/chat/message", post(chat::chat_message))
        .route("/chat/confirm", post(chat::confirm_tool_call))
        .route(
            "/chat/history",
            get(chat::get_history).delete(chat::clear_history),
        )
        .layer(middleware::from_fn_with_state(state.clone(), api_rate_limit));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .with_state(state)
}

/// Liveness endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "whiskers-agent",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn api_rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.api_limiter.check(addr.ip()) {
        tracing::warn!(addr = %addr.ip(), "api rate limit exceeded");
        return Err(ApiError::RateLimited(
            "Too many requests, please try again later".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

async fn auth_rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.auth_limiter.check(addr.ip()) {
        tracing::warn!(addr = %addr.ip(), "auth rate limit exceeded");
        return Err(ApiError::RateLimited(
            "Too many authentication attempts, please try again later".to_string(),
        ));
    }
    Ok(next.run(request).await)
}
