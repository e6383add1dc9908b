//! HTTP server for the Whiskers assistant API.
//!
//! Provides REST endpoints for:
//! - Auth (register/login with bearer tokens)
//! - Task and note CRUD
//! - The chat assistant (SSE streaming and non-streaming)

pub mod auth;
pub mod chat;
pub mod error;
pub mod notes;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod tasks;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::errors::{AppError, AppResult};

/// Start the HTTP server.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<AppState>, port: u16) -> AppResult<()> {
    run_server_with_shutdown(state, port, std::future::pending()).await
}

/// Start the HTTP server with graceful shutdown support.
///
/// The server stops accepting new connections when `shutdown_signal`
/// completes.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = cors_layer(&state)?;
    let app: Router = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Whiskers agent server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    Ok(())
}

fn cors_layer(state: &AppState) -> AppResult<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match &state.config.server.client_url {
        Some(origin) => {
            let origin = HeaderValue::from_str(origin).map_err(|_| {
                AppError::InvalidConfig(format!("client_url is not a valid origin: {origin}"))
            })?;
            Ok(cors.allow_origin(origin))
        }
        None => Ok(cors.allow_origin(Any)),
    }
}
