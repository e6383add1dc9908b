//! Upstream language-model integration: wire types and streaming client.

pub mod client;
pub mod types;

pub use client::LlmClient;
pub use types::{ChatChunk, ChatMessage, ToolSpec};
