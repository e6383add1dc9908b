//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::assistant::{ChatSession, PendingToolCalls, PromptBuilder, ToolExecutor, ToolRegistry};
use crate::core::config::AppConfig;
use crate::core::errors::AppResult;
use crate::llm::LlmClient;
use crate::storage::Storage;

use super::rate_limit::RateLimiter;

/// Shared application state.
pub struct AppState {
    /// Validated configuration.
    pub config: AppConfig,
    /// Persistent stores.
    pub storage: Storage,
    /// Upstream model client.
    pub llm: LlmClient,
    /// Tools advertised to the model.
    pub registry: ToolRegistry,
    /// Prompt-context assembly.
    pub prompt: PromptBuilder,
    /// Chat turn driver.
    pub session: ChatSession,
    /// Tool calls awaiting confirmation.
    pub pending: PendingToolCalls,
    /// Per-IP limiter for general API traffic.
    pub api_limiter: RateLimiter,
    /// Stricter per-IP limiter for auth endpoints.
    pub auth_limiter: RateLimiter,
}

impl AppState {
    /// Wire up the application from configuration and an open store.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the upstream
    /// client cannot be built.
    pub fn new(config: AppConfig, storage: Storage) -> AppResult<Arc<Self>> {
        config.validate()?;

        let llm = LlmClient::new(config.llm.clone())?;
        let pending = PendingToolCalls::new(config.chat.pending_ttl);
        let executor = ToolExecutor::new(storage.tasks(), storage.notes(), config.limits.clone());
        let session = ChatSession::new(
            storage.turns(),
            executor,
            pending.clone(),
            config.chat.auto_execute_tools,
        );

        Ok(Arc::new(Self {
            prompt: PromptBuilder::new(config.chat.history_window),
            registry: ToolRegistry::standard(),
            api_limiter: RateLimiter::new(config.auth.api_rate_limit, config.auth.rate_limit_window),
            auth_limiter: RateLimiter::new(
                config.auth.auth_rate_limit,
                config.auth.rate_limit_window,
            ),
            config,
            storage,
            llm,
            session,
            pending,
        }))
    }
}
