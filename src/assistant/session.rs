//! Per-request chat session: relays upstream tokens, reassembles tool
//! calls, executes at most one, and persists the conversation turns.
//!
//! A session moves through INIT, STREAMING, then either EXECUTING_TOOL or
//! FINALIZING, and finally CLOSED. Events flow to the HTTP layer through
//! an mpsc channel; a failed send means the client went away, which aborts
//! the session and stops consuming the upstream stream.

use std::future::Future;

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::errors::AppResult;
use crate::core::ids::UserId;
use crate::core::models::{ConversationTurn, ExecutionResult, Role, ToolCallRecord};
use crate::llm::types::{AssistantMessage, ChatChunk};

use super::accumulator::ToolCallAccumulator;
use super::executor::ToolExecutor;
use super::pending::{PendingToolCall, PendingToolCalls};
use crate::storage::TurnStore;

/// Status text of the `start` event.
const THINKING_MESSAGE: &str = "Whiskers is thinking... 🐱";
/// Prefix of in-band stream error messages.
const ERROR_PREFIX: &str = "Meow... something went wrong! 😿";

/// One event of the outbound chat stream.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The session accepted the message and is contacting the model.
    #[serde(rename_all = "camelCase")]
    Start {
        /// Human-readable status text.
        message: String,
    },
    /// One incremental text fragment, append-order-sensitive.
    #[serde(rename_all = "camelCase")]
    Token {
        /// The fragment.
        content: String,
    },
    /// A tool call was executed automatically.
    #[serde(rename_all = "camelCase")]
    ToolExecuted {
        /// The executed call with parsed arguments.
        tool_call: ToolCallView,
        /// Execution outcome.
        result: ExecutionResult,
    },
    /// A tool call is waiting for explicit confirmation.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        /// The pending call with parsed arguments.
        tool_call: ToolCallView,
    },
    /// The session finished.
    #[serde(rename_all = "camelCase")]
    Done {
        /// Full accumulated response text.
        full_message: String,
        /// Whether a tool call awaits confirmation.
        requires_confirmation: bool,
        /// Outcome of the executed tool call, if one ran.
        #[serde(skip_serializing_if = "Option::is_none")]
        execution_result: Option<ExecutionResult>,
    },
    /// The session failed after streaming began.
    #[serde(rename_all = "camelCase")]
    Error {
        /// User-facing error text.
        message: String,
    },
}

/// Client-facing view of a tool call, with arguments already parsed.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallView {
    /// Upstream call id.
    pub id: String,
    /// The requested function.
    pub function: FunctionView,
}

/// Function half of a [`ToolCallView`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionView {
    /// Function name.
    pub name: String,
    /// Parsed arguments.
    pub arguments: Value,
}

/// Response body of the non-streaming chat and confirmation endpoints.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Whether the turn completed.
    pub success: bool,
    /// Assistant text or outcome message.
    pub message: String,
    /// Whether a tool call awaits confirmation.
    pub requires_confirmation: bool,
    /// The tool call, present when one was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallView>,
    /// Outcome of the executed tool call, if one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,
}

/// The receiving side hung up; the session must stop writing.
struct SessionClosed;

/// Drives one chat turn end to end.
#[derive(Clone)]
pub struct ChatSession {
    turns: TurnStore,
    executor: ToolExecutor,
    pending: PendingToolCalls,
    auto_execute: bool,
}

impl ChatSession {
    /// Build a session driver.
    #[must_use]
    pub fn new(
        turns: TurnStore,
        executor: ToolExecutor,
        pending: PendingToolCalls,
        auto_execute: bool,
    ) -> Self {
        Self {
            turns,
            executor,
            pending,
            auto_execute,
        }
    }

    /// Run one streaming turn, emitting [`ChatEvent`]s on `events` until
    /// the turn completes or fails.
    ///
    /// `open` is awaited only after the user turn is persisted and the
    /// `start` event is emitted, so an upstream failure never drops the
    /// user's message. Tokens already emitted stand even if a later step
    /// fails; failures after the `start` event are reported as in-band
    /// `error` events.
    pub async fn run<S>(
        &self,
        owner: UserId,
        message: &str,
        open: impl Future<Output = AppResult<S>>,
        events: mpsc::Sender<ChatEvent>,
    ) where
        S: Stream<Item = AppResult<ChatChunk>>,
    {
        if self.run_inner(owner, message, open, &events).await.is_err() {
            tracing::debug!(%owner, "chat client disconnected mid-stream");
        }
    }

    async fn run_inner<S>(
        &self,
        owner: UserId,
        message: &str,
        open: impl Future<Output = AppResult<S>>,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<(), SessionClosed>
    where
        S: Stream<Item = AppResult<ChatChunk>>,
    {
        let user_turn = ConversationTurn::new(owner, Role::User, message);
        if let Err(e) = self.turns.append(&user_turn).await {
            tracing::error!(%owner, error = %e, "failed to persist user turn");
            return self.fail(events, &e.to_string()).await;
        }

        send(events, ChatEvent::Start {
            message: THINKING_MESSAGE.to_string(),
        })
        .await?;

        let chunks = match open.await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!(%owner, error = %e, "failed to open upstream stream");
                return self.fail(events, &e.to_string()).await;
            }
        };

        let mut buffer = String::new();
        let mut accumulator = ToolCallAccumulator::new();

        tokio::pin!(chunks);
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::error!(%owner, error = %e, "upstream stream failed");
                    return self.fail(events, &e.to_string()).await;
                }
            };
            let Some(delta) = chunk.delta() else {
                continue;
            };
            if let Some(content) = &delta.content {
                buffer.push_str(content);
                send(events, ChatEvent::Token {
                    content: content.clone(),
                })
                .await?;
            }
            if let Some(calls) = &delta.tool_calls {
                for fragment in calls {
                    accumulator.apply(fragment);
                }
            }
        }

        if accumulator.is_empty() {
            return self.finalize(owner, buffer, events).await;
        }
        self.execute_first_call(owner, buffer, accumulator.into_records(), events)
            .await
    }

    /// FINALIZING: no tool call was requested.
    async fn finalize(
        &self,
        owner: UserId,
        buffer: String,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<(), SessionClosed> {
        let turn = ConversationTurn::new(owner, Role::Assistant, buffer.clone());
        if let Err(e) = self.turns.append(&turn).await {
            tracing::error!(%owner, error = %e, "failed to persist assistant turn");
            return self.fail(events, &e.to_string()).await;
        }
        send(events, ChatEvent::Done {
            full_message: buffer,
            requires_confirmation: false,
            execution_result: None,
        })
        .await
    }

    /// EXECUTING_TOOL: act on the first reassembled call only.
    async fn execute_first_call(
        &self,
        owner: UserId,
        buffer: String,
        records: Vec<ToolCallRecord>,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<(), SessionClosed> {
        // records is non-empty: the accumulator saw at least one fragment.
        let Some(first) = records.first().cloned() else {
            return self.finalize(owner, buffer, events).await;
        };

        let arguments: Value = match serde_json::from_str(&first.function.arguments) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(%owner, function = %first.function.name, error = %e,
                    "tool-call arguments did not reassemble into valid JSON");
                return self.fail(events, &format!("invalid tool arguments: {e}")).await;
            }
        };

        let assistant_turn =
            ConversationTurn::new(owner, Role::Assistant, buffer.clone()).with_tool_calls(records);
        if let Err(e) = self.turns.append(&assistant_turn).await {
            tracing::error!(%owner, error = %e, "failed to persist assistant turn");
            return self.fail(events, &e.to_string()).await;
        }

        let name = first.function.name.clone();
        let view = ToolCallView {
            id: first.id.clone(),
            function: FunctionView {
                name: name.clone(),
                arguments: arguments.clone(),
            },
        };

        if !self.auto_execute {
            self.pending.insert(first.id, name, arguments, owner);
            send(events, ChatEvent::ToolCall { tool_call: view }).await?;
            return send(events, ChatEvent::Done {
                full_message: buffer,
                requires_confirmation: true,
                execution_result: None,
            })
            .await;
        }

        let result = self.executor.execute(&name, &arguments, owner).await;
        if let Err(e) = self.record_outcome(owner, &name, &result).await {
            tracing::error!(%owner, error = %e, "failed to persist tool outcome turn");
            return self.fail(events, &e.to_string()).await;
        }

        send(events, ChatEvent::ToolExecuted {
            tool_call: view,
            result: result.clone(),
        })
        .await?;
        send(events, ChatEvent::Done {
            full_message: buffer,
            requires_confirmation: false,
            execution_result: Some(result),
        })
        .await
    }

    /// Complete one non-streaming turn from an already-fetched completion.
    ///
    /// # Errors
    /// Returns an error when a turn cannot be persisted or the model
    /// produced unparseable tool arguments.
    pub async fn complete_turn(
        &self,
        owner: UserId,
        message: &str,
        assistant: AssistantMessage,
    ) -> AppResult<ChatResponse> {
        self.turns
            .append(&ConversationTurn::new(owner, Role::User, message))
            .await?;

        let content = assistant.content.clone().unwrap_or_default();
        let records = assistant.tool_calls.unwrap_or_default();
        let Some(first) = records.first().cloned() else {
            self.turns
                .append(&ConversationTurn::new(owner, Role::Assistant, content.clone()))
                .await?;
            return Ok(ChatResponse {
                success: true,
                message: content,
                requires_confirmation: false,
                tool_call: None,
                execution_result: None,
            });
        };

        let arguments: Value = serde_json::from_str(&first.function.arguments)?;
        let assistant_turn =
            ConversationTurn::new(owner, Role::Assistant, content.clone()).with_tool_calls(records);
        self.turns.append(&assistant_turn).await?;

        let name = first.function.name.clone();
        let view = ToolCallView {
            id: first.id.clone(),
            function: FunctionView {
                name: name.clone(),
                arguments: arguments.clone(),
            },
        };

        if !self.auto_execute {
            self.pending.insert(first.id, name, arguments, owner);
            return Ok(ChatResponse {
                success: true,
                message: content,
                requires_confirmation: true,
                tool_call: Some(view),
                execution_result: None,
            });
        }

        let result = self.executor.execute(&name, &arguments, owner).await;
        self.record_outcome(owner, &name, &result).await?;
        Ok(ChatResponse {
            success: true,
            message: content,
            requires_confirmation: false,
            tool_call: Some(view),
            execution_result: Some(result),
        })
    }

    /// Execute a previously stored pending call after user approval.
    ///
    /// # Errors
    /// Returns an error when the outcome turn cannot be persisted.
    pub async fn execute_confirmed(
        &self,
        owner: UserId,
        call: PendingToolCall,
    ) -> AppResult<ChatResponse> {
        let result = self
            .executor
            .execute(&call.function_name, &call.arguments, owner)
            .await;
        self.record_outcome(owner, &call.function_name, &result)
            .await?;
        Ok(ChatResponse {
            success: result.success,
            message: result.message.clone(),
            requires_confirmation: false,
            tool_call: None,
            execution_result: Some(result),
        })
    }

    /// Record that the user rejected a pending call.
    ///
    /// # Errors
    /// Returns an error when the outcome turn cannot be persisted.
    pub async fn discard_rejected(&self, owner: UserId, call: &PendingToolCall) -> AppResult<()> {
        let turn = ConversationTurn::new(
            owner,
            Role::System,
            format!("Function {} cancelled by user", call.function_name),
        )
        .with_metadata("functionName", call.function_name.clone());
        self.turns.append(&turn).await
    }

    async fn record_outcome(
        &self,
        owner: UserId,
        name: &str,
        result: &ExecutionResult,
    ) -> AppResult<()> {
        let turn = ConversationTurn::new(
            owner,
            Role::System,
            format!("Function {name} executed: {}", result.message),
        )
        .with_metadata("functionName", name)
        .with_metadata(
            "functionResult",
            serde_json::to_string(result).unwrap_or_default(),
        );
        self.turns.append(&turn).await
    }

    async fn fail(
        &self,
        events: &mpsc::Sender<ChatEvent>,
        detail: &str,
    ) -> Result<(), SessionClosed> {
        send(events, ChatEvent::Error {
            message: format!("{ERROR_PREFIX} {detail}"),
        })
        .await
    }
}

async fn send(events: &mpsc::Sender<ChatEvent>, event: ChatEvent) -> Result<(), SessionClosed> {
    events.send(event).await.map_err(|_| SessionClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LimitsConfig;
    use crate::llm::types::{ChunkChoice, ChunkDelta, FunctionDelta, ToolCallDelta};
    use crate::storage::Storage;
    use futures::stream;
    use std::time::Duration;

    fn text_chunk(content: &str) -> ChatChunk {
        ChatChunk {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: Some(content.to_string()),
                    tool_calls: None,
                },
            }],
        }
    }

    fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ChatChunk {
        ChatChunk {
            choices: vec![ChunkChoice {
                delta: ChunkDelta {
                    content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index,
                        id: id.map(str::to_string),
                        kind: id.map(|_| "function".to_string()),
                        function: Some(FunctionDelta {
                            name: name.map(str::to_string),
                            arguments: args.map(str::to_string),
                        }),
                    }]),
                },
            }],
        }
    }

    async fn session(auto_execute: bool) -> (Storage, ChatSession, UserId) {
        let storage = Storage::open_in_memory().await.unwrap();
        let executor =
            ToolExecutor::new(storage.tasks(), storage.notes(), LimitsConfig::default());
        let session = ChatSession::new(
            storage.turns(),
            executor,
            PendingToolCalls::new(Duration::from_secs(300)),
            auto_execute,
        );
        (storage, session, UserId::new())
    }

    type ChunkStream = stream::Iter<std::vec::IntoIter<AppResult<ChatChunk>>>;

    async fn collect(
        session: &ChatSession,
        owner: UserId,
        message: &str,
        chunks: Vec<AppResult<ChatChunk>>,
    ) -> Vec<ChatEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        session
            .run(owner, message, async { Ok(stream::iter(chunks)) }, tx)
            .await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn token_concatenation_equals_done_full_message() {
        let (_storage, session, owner) = session(true).await;
        let chunks = vec![
            Ok(text_chunk("Hel")),
            Ok(text_chunk("lo, ")),
            Ok(text_chunk("world!")),
        ];

        let events = collect(&session, owner, "say hello", chunks).await;
        assert!(matches!(events.first(), Some(ChatEvent::Start { .. })));

        let mut concatenated = String::new();
        for event in &events {
            if let ChatEvent::Token { content } = event {
                concatenated.push_str(content);
            }
        }
        match events.last() {
            Some(ChatEvent::Done {
                full_message,
                requires_confirmation,
                execution_result,
            }) => {
                assert_eq!(full_message, &concatenated);
                assert_eq!(full_message, "Hello, world!");
                assert!(!requires_confirmation);
                assert!(execution_result.is_none());
            }
            other => panic!("expected done event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_turn_persists_user_and_assistant_turns() {
        let (storage, session, owner) = session(true).await;
        collect(&session, owner, "hi", vec![Ok(text_chunk("hello!"))]).await;

        let turns = storage.turns().recent(owner, 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "hi");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].content, "hello!");
    }

    #[tokio::test]
    async fn fragmented_tool_call_creates_task_and_reports_execution() {
        let (storage, session, owner) = session(true).await;
        let chunks = vec![
            Ok(tool_chunk(0, Some("call_1"), Some("create_task"), Some(""))),
            Ok(tool_chunk(0, None, None, Some("{\"title\":\"Buy gro"))),
            Ok(tool_chunk(0, None, None, Some("ceries\",\"description\":"))),
            Ok(tool_chunk(0, None, None, Some("\"Buy groceries from the store\"}"))),
        ];

        let events = collect(&session, owner, "Create a task to buy groceries", chunks).await;

        let executed = events
            .iter()
            .find_map(|e| match e {
                ChatEvent::ToolExecuted { tool_call, result } => Some((tool_call, result)),
                _ => None,
            })
            .expect("tool_executed event");
        assert_eq!(executed.0.function.name, "create_task");
        assert_eq!(executed.0.function.arguments["title"], "Buy groceries");
        assert!(executed.1.success);

        match events.last() {
            Some(ChatEvent::Done {
                requires_confirmation,
                execution_result,
                ..
            }) => {
                assert!(!requires_confirmation);
                assert!(execution_result.as_ref().unwrap().success);
            }
            other => panic!("expected done event, got {other:?}"),
        }

        let tasks = storage.tasks().list(owner).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Buy groceries");

        // user turn, assistant turn with the raw record, system outcome turn
        let turns = storage.turns().recent(owner, 10).await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].tool_calls[0].function.name, "create_task");
        assert_eq!(turns[2].role, Role::System);
        assert!(turns[2].content.contains("create_task"));
    }

    #[tokio::test]
    async fn only_the_first_tool_call_is_executed() {
        let (storage, session, owner) = session(true).await;
        let chunks = vec![
            Ok(tool_chunk(
                0,
                Some("call_a"),
                Some("create_task"),
                Some("{\"title\":\"First one\",\"description\":\"the one to act on\"}"),
            )),
            Ok(tool_chunk(
                1,
                Some("call_b"),
                Some("create_task"),
                Some("{\"title\":\"Second one\",\"description\":\"must be ignored\"}"),
            )),
        ];

        collect(&session, owner, "create two tasks", chunks).await;

        let tasks = storage.tasks().list(owner).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "First one");
    }

    #[tokio::test]
    async fn malformed_tool_arguments_fail_in_band_without_execution() {
        let (storage, session, owner) = session(true).await;
        let chunks = vec![Ok(tool_chunk(
            0,
            Some("call_1"),
            Some("create_task"),
            Some("{\"title\": truncated"),
        ))];

        let events = collect(&session, owner, "create a task", chunks).await;
        assert!(matches!(events.last(), Some(ChatEvent::Error { .. })));
        assert_eq!(storage.tasks().count(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upstream_error_is_reported_after_flushed_tokens() {
        let (_storage, session, owner) = session(true).await;
        let chunks = vec![
            Ok(text_chunk("partial ")),
            Err(crate::core::errors::AppError::Upstream(
                "connection reset".to_string(),
            )),
        ];

        let events = collect(&session, owner, "hello", chunks).await;
        assert!(matches!(events[1], ChatEvent::Token { .. }));
        match events.last() {
            Some(ChatEvent::Error { message }) => {
                assert!(message.contains("connection reset"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn manual_mode_stores_pending_call_and_asks_for_confirmation() {
        let (storage, session, owner) = session(false).await;
        let pending = session.pending.clone();
        let chunks = vec![Ok(tool_chunk(
            0,
            Some("call_9"),
            Some("create_note"),
            Some("{\"title\":\"Ideas\",\"content\":\"brainstorm later\"}"),
        ))];

        let events = collect(&session, owner, "note my ideas", chunks).await;

        assert!(events.iter().any(|e| matches!(e, ChatEvent::ToolCall { .. })));
        match events.last() {
            Some(ChatEvent::Done {
                requires_confirmation,
                ..
            }) => assert!(requires_confirmation),
            other => panic!("expected done event, got {other:?}"),
        }

        // Nothing executed yet; the call is parked.
        assert_eq!(storage.notes().count(owner).await.unwrap(), 0);
        let call = pending.take("call_9", owner).unwrap();
        assert_eq!(call.function_name, "create_note");

        // Confirming runs it.
        let response = session.execute_confirmed(owner, call).await.unwrap();
        assert!(response.success);
        assert_eq!(storage.notes().count(owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn disconnected_client_aborts_quietly() {
        let (_storage, session, owner) = session(true).await;
        let (tx, rx) = mpsc::channel(64);
        drop(rx);
        session
            .run(
                owner,
                "hi",
                async { Ok(stream::iter(vec![Ok(text_chunk("hello"))])) },
                tx,
            )
            .await;
    }

    #[tokio::test]
    async fn failed_upstream_open_keeps_user_turn_and_errors_in_band() {
        let (storage, session, owner) = session(true).await;
        let open = async {
            Err::<ChunkStream, _>(crate::core::errors::AppError::Upstream(
                "connection refused".to_string(),
            ))
        };

        let (tx, mut rx) = mpsc::channel(64);
        session.run(owner, "hello there", open, tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        // start goes out first, then the failure as an in-band event.
        assert!(matches!(events.first(), Some(ChatEvent::Start { .. })));
        match events.last() {
            Some(ChatEvent::Error { message }) => {
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected error event, got {other:?}"),
        }

        // The user's message was persisted before the upstream call.
        let turns = storage.turns().recent(owner, 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "hello there");
    }

    #[tokio::test]
    async fn non_streaming_turn_without_tools_returns_text() {
        let (storage, session, owner) = session(true).await;
        let assistant = AssistantMessage {
            content: Some("Purr... all good!".to_string()),
            tool_calls: None,
        };

        let response = session.complete_turn(owner, "hello", assistant).await.unwrap();
        assert!(response.success);
        assert_eq!(response.message, "Purr... all good!");
        assert!(!response.requires_confirmation);
        assert_eq!(storage.turns().count(owner).await.unwrap(), 2);
    }
}
