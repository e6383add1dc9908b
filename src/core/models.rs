//! Domain models: tasks, notes, users, and conversation turns.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ids::{NoteId, TaskId, TurnId, UserId};

/// Role of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sent by the human.
    User,
    /// Sent by the model.
    Assistant,
    /// Emitted by the server (tool outcomes, instructions).
    System,
}

impl Role {
    /// Stable string form used for storage and the upstream API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// One tool call the model requested, embedded in an assistant turn.
///
/// `arguments` is the raw JSON text exactly as the model emitted it; it is
/// parsed only at execution time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Upstream-assigned call identifier.
    pub id: String,
    /// Type tag, currently always `function`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The requested function.
    pub function: FunctionCall,
}

/// Function name and serialized arguments of a tool call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name from the tool registry.
    pub name: String,
    /// Arguments serialized as JSON text.
    pub arguments: String,
}

/// One message in a conversation. Immutable once created; only bulk
/// deletion per owner is supported.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    /// Turn identifier.
    pub id: TurnId,
    /// Owning user.
    pub owner: UserId,
    /// Turn role.
    pub role: Role,
    /// Text content; may be empty for pure tool-call turns.
    pub content: String,
    /// Tool calls requested in this turn, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Free-form key/value annotations.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a turn with no tool calls or metadata.
    #[must_use]
    pub fn new(owner: UserId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            owner,
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach tool-call records.
    #[must_use]
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle state of a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started yet.
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    /// Currently being worked on.
    #[serde(rename = "In Progress")]
    InProgress,
    /// Finished.
    #[serde(rename = "Completed")]
    Completed,
}

impl TaskStatus {
    /// Stable string form used for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Not Started" => Some(Self::NotStarted),
            "In Progress" => Some(Self::InProgress),
            "Completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A task owned by one user.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// Owning user.
    pub owner: UserId,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a task owned by `owner`.
    #[must_use]
    pub fn new(
        owner: UserId,
        title: impl Into<String>,
        description: impl Into<String>,
        status: TaskStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            owner,
            title: title.into(),
            description: description.into(),
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A note owned by one user.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Note identifier.
    pub id: NoteId,
    /// Owning user.
    pub owner: UserId,
    /// Short title.
    pub title: String,
    /// Note body.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create a note owned by `owner`.
    #[must_use]
    pub fn new(owner: UserId, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NoteId::new(),
            owner,
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A registered user. The password hash never leaves the server.
#[derive(Clone, Debug)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Login email, unique.
    pub email: String,
    /// Salted password digest, `salt$hash` hex.
    pub password_hash: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Outcome of one tool execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the tool ran and persisted its effect.
    pub success: bool,
    /// Human-readable outcome text.
    pub message: String,
    /// The created or fetched entities, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ExecutionResult {
    /// Successful outcome with an attached entity.
    #[must_use]
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Failed outcome; nothing was persisted.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_round_trips() {
        for status in [
            TaskStatus::NotStarted,
            TaskStatus::InProgress,
            TaskStatus::Completed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("Done"), None);
    }

    #[test]
    fn task_status_wire_form_matches_storage_form() {
        let json = serde_json::to_string(&TaskStatus::NotStarted).unwrap();
        assert_eq!(json, "\"Not Started\"");
    }

    #[test]
    fn empty_tool_calls_are_omitted_from_wire_output() {
        let turn = ConversationTurn::new(UserId::new(), Role::User, "hi");
        let json = serde_json::to_value(&turn).unwrap();
        assert!(json.get("toolCalls").is_none());
        assert_eq!(json["role"], "user");
    }
}
