//! Configuration for the whiskers agent server.
//!
//! Every tunable the handlers rely on lives here: network settings, auth
//! windows, upstream model parameters, chat behavior, and the entity
//! validation bounds. Values come from `WHISKERS_*` environment variables
//! with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::{AppError, AppResult};

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Authentication settings.
    pub auth: AuthConfig,
    /// Upstream language-model settings.
    pub llm: LlmConfig,
    /// Chat assistant behavior.
    pub chat: ChatConfig,
    /// Entity validation bounds.
    pub limits: LimitsConfig,
    /// Storage settings.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Build the configuration from `WHISKERS_*` environment variables,
    /// falling back to defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_parse("WHISKERS_PORT") {
            config.server.port = port;
        }
        if let Ok(origin) = std::env::var("WHISKERS_CLIENT_URL") {
            config.server.client_url = Some(origin);
        }
        if let Ok(key) = std::env::var("WHISKERS_OPENAI_API_KEY") {
            config.llm.api_key = key;
        }
        if let Ok(url) = std::env::var("WHISKERS_OPENAI_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("WHISKERS_OPENAI_MODEL") {
            config.llm.model = model;
        }
        if let Some(auto) = env_parse("WHISKERS_AUTO_EXECUTE_TOOLS") {
            config.chat.auto_execute_tools = auto;
        }
        if let Ok(path) = std::env::var("WHISKERS_DB_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }

        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> AppResult<()> {
        if self.chat.history_window == 0 {
            return Err(AppError::InvalidConfig(
                "chat.history_window must be > 0".to_string(),
            ));
        }

        if self.chat.pending_ttl.is_zero() {
            return Err(AppError::InvalidConfig(
                "chat.pending_ttl must be > 0".to_string(),
            ));
        }

        if self.auth.token_ttl.is_zero() {
            return Err(AppError::InvalidConfig(
                "auth.token_ttl must be > 0".to_string(),
            ));
        }

        if self.limits.task_title_min == 0 || self.limits.note_title_min == 0 {
            return Err(AppError::InvalidConfig(
                "minimum title lengths must be > 0".to_string(),
            ));
        }

        Url::parse(&self.llm.base_url)?;

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Allowed browser origin, if restricted.
    pub client_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            client_url: None,
        }
    }
}

/// Authentication and rate-limiting settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How long an issued bearer token stays valid.
    pub token_ttl: Duration,
    /// Minimum password length at registration.
    pub password_min_chars: usize,
    /// General API requests allowed per window per IP.
    pub api_rate_limit: u32,
    /// Auth endpoint requests allowed per window per IP.
    pub auth_rate_limit: u32,
    /// Fixed rate-limit window size.
    pub rate_limit_window: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(60 * 60 * 24 * 30),
            password_min_chars: 8,
            api_rate_limit: 100,
            auth_rate_limit: 5,
            rate_limit_window: Duration::from_secs(15 * 60),
        }
    }
}

/// Upstream language-model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Bearer key for the upstream API.
    pub api_key: String,
    /// Model name to request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
        }
    }
}

/// Chat assistant behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of trailing history turns included in the prompt context.
    pub history_window: usize,
    /// Default number of turns returned by the history endpoint.
    pub history_fetch_default: usize,
    /// Maximum accepted chat message length in characters.
    pub message_max_chars: usize,
    /// Lifetime of an unconfirmed pending tool call.
    pub pending_ttl: Duration,
    /// Execute a detected tool call immediately instead of asking the user.
    pub auto_execute_tools: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            history_fetch_default: 50,
            message_max_chars: 2000,
            pending_ttl: Duration::from_secs(5 * 60),
            auto_execute_tools: true,
        }
    }
}

/// Validation bounds for tasks and notes.
///
/// The minimums guard against degenerate model output; they are
/// configuration, not product rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Minimum trimmed task title length.
    pub task_title_min: usize,
    /// Maximum task title length.
    pub task_title_max: usize,
    /// Minimum trimmed task description length.
    pub task_description_min: usize,
    /// Maximum task description length.
    pub task_description_max: usize,
    /// Minimum trimmed note title length.
    pub note_title_min: usize,
    /// Maximum note title length.
    pub note_title_max: usize,
    /// Minimum trimmed note content length.
    pub note_content_min: usize,
    /// Maximum note content length.
    pub note_content_max: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            task_title_min: 3,
            task_title_max: 200,
            task_description_min: 5,
            task_description_max: 1000,
            note_title_min: 2,
            note_title_max: 150,
            note_content_min: 1,
            note_content_max: 5000,
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("whiskers.sqlite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_history_window_is_rejected() {
        let mut config = AppConfig::default();
        config.chat.history_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut config = AppConfig::default();
        config.llm.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
