//! Async client for an OpenAI-compatible chat-completions endpoint.
//!
//! Streaming responses arrive as server-sent events: `data: <json>` lines
//! terminated by `data: [DONE]`. The stream is decoded line-by-line off the
//! response body and re-emitted as parsed [`ChatChunk`]s over a channel, so
//! callers see an ordinary `Stream` and dropping it stops the decode task.

use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use crate::core::config::LlmConfig;
use crate::core::errors::{AppError, AppResult};
use crate::llm::types::{
    AssistantMessage, ChatChunk, ChatMessage, Completion, CompletionRequest, ToolSpec,
};

/// Connect timeout for upstream requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Overall timeout for non-streaming completions.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Buffered chunks between the decode task and the consumer.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Client for the upstream language-model API.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Build a client from the configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: LlmConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Run one non-streaming completion and return the assistant message.
    ///
    /// # Errors
    /// Returns `AppError::Upstream` on a non-success status or an empty
    /// choice list.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> AppResult<AssistantMessage> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            tools,
            tool_choice: (!tools.is_empty()).then_some("auto"),
            temperature: self.config.temperature,
            stream: false,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "completion failed with status {status}: {body}"
            )));
        }

        let completion: Completion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AppError::Upstream("completion returned no choices".to_string()))
    }

    /// Open a streaming completion. The returned stream yields parsed
    /// chunks in upstream order and ends after the `[DONE]` marker or the
    /// first transport/decode error.
    ///
    /// # Errors
    /// Returns `AppError::Upstream` if the request is rejected before any
    /// chunk is produced.
    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> AppResult<ReceiverStream<AppResult<ChatChunk>>> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            tools,
            tool_choice: (!tools.is_empty()).then_some("auto"),
            temperature: self.config.temperature,
            stream: true,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "stream request failed with status {status}: {body}"
            )));
        }

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let body = response.bytes_stream().map_err(std::io::Error::other);
            let mut lines = FramedRead::new(StreamReader::new(body), LinesCodec::new());

            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        let _ = tx
                            .send(Err(AppError::Upstream(format!(
                                "stream transport error: {e}"
                            ))))
                            .await;
                        return;
                    }
                };

                let Some(payload) = line.strip_prefix("data:") else {
                    // SSE comments and blank keep-alive lines.
                    continue;
                };
                let payload = payload.trim();
                if payload == "[DONE]" {
                    return;
                }

                match serde_json::from_str::<ChatChunk>(payload) {
                    Ok(chunk) => {
                        // Consumer gone: stop decoding and let the
                        // connection drop.
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(AppError::Upstream(format!(
                                "malformed stream chunk: {e}"
                            ))))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}
