//! Startup helpers for the Whiskers agent server.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::AppConfig;
use crate::server::{self, AppState};
use crate::storage::Storage;

/// How often expired pending tool calls and stale rate-limit windows are
/// swept.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Run the server (used by the `whiskers-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Whiskers agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        return ExitCode::from(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async {
        let storage = Storage::open(&config.storage.sqlite_path).await?;
        let state = AppState::new(config, storage)?;
        spawn_maintenance(state.clone());

        let port = state.config.server.port;
        server::run_server_with_shutdown(state, port, shutdown_signal()).await
    });

    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

/// Periodically drop expired pending tool calls and stale rate-limit
/// windows.
pub fn spawn_maintenance(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = state.pending.sweep();
            if removed > 0 {
                tracing::debug!(removed, "expired pending tool calls swept");
            }
            state.api_limiter.sweep();
            state.auth_limiter.sweep();
        }
    });
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
