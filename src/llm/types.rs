//! Wire types for the OpenAI-compatible chat-completions API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::models::{Role, ToolCallRecord};

/// One prompt message sent upstream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A callable tool advertised to the model.
#[derive(Clone, Debug, Serialize)]
pub struct ToolSpec {
    /// Tool type tag, always `function`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// The function contract.
    pub function: FunctionSpec,
}

/// Function name, model-facing description, and parameter contract.
#[derive(Clone, Debug, Serialize)]
pub struct FunctionSpec {
    /// Unique function name.
    pub name: &'static str,
    /// Description the model uses to decide when to call this tool.
    pub description: &'static str,
    /// JSON-schema-like parameter declaration.
    pub parameters: ParameterSchema,
}

/// Object-typed parameter schema.
#[derive(Clone, Debug, Serialize)]
pub struct ParameterSchema {
    /// Schema type tag, always `object`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Parameter name to its schema.
    pub properties: BTreeMap<&'static str, PropertySchema>,
    /// Names of required parameters.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<&'static str>,
}

impl ParameterSchema {
    /// An object schema with no parameters.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kind: "object",
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

/// Schema of one parameter.
#[derive(Clone, Debug, Serialize)]
pub struct PropertySchema {
    /// Primitive type name (`string`, ...).
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Model-facing description.
    pub description: &'static str,
    /// Allowed values for enumerations.
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<&'static str>>,
}

impl PropertySchema {
    /// A free-form string parameter.
    #[must_use]
    pub fn string(description: &'static str) -> Self {
        Self {
            kind: "string",
            description,
            allowed: None,
        }
    }

    /// A string parameter restricted to `allowed` values.
    #[must_use]
    pub fn string_enum(description: &'static str, allowed: Vec<&'static str>) -> Self {
        Self {
            kind: "string",
            description,
            allowed: Some(allowed),
        }
    }
}

/// Request body for `/chat/completions`.
#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest<'a> {
    /// Model name.
    pub model: &'a str,
    /// Prompt context.
    pub messages: &'a [ChatMessage],
    /// Advertised tools, omitted when empty.
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub tools: &'a [ToolSpec],
    /// Tool selection policy; the model decides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Whether to stream the response.
    pub stream: bool,
}

/// Non-streaming completion response.
#[derive(Clone, Debug, Deserialize)]
pub struct Completion {
    /// Completion choices; the first is used.
    pub choices: Vec<CompletionChoice>,
}

/// One non-streaming choice.
#[derive(Clone, Debug, Deserialize)]
pub struct CompletionChoice {
    /// The assistant message.
    pub message: AssistantMessage,
}

/// Assistant output of a non-streaming completion.
#[derive(Clone, Debug, Deserialize)]
pub struct AssistantMessage {
    /// Text content; absent for pure tool-call responses.
    #[serde(default)]
    pub content: Option<String>,
    /// Requested tool calls, if any.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
}

/// One streamed chunk of a completion.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatChunk {
    /// Chunk choices; the first is used.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatChunk {
    /// The delta of the first choice, if present.
    #[must_use]
    pub fn delta(&self) -> Option<&ChunkDelta> {
        self.choices.first().map(|c| &c.delta)
    }
}

/// One streamed choice. The end of the stream is signalled by the
/// `[DONE]` sentinel, so only the delta is kept.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChunkChoice {
    /// Incremental payload.
    #[serde(default)]
    pub delta: ChunkDelta,
}

/// Incremental delta carried by one chunk.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChunkDelta {
    /// Text fragment.
    #[serde(default)]
    pub content: Option<String>,
    /// Tool-call fragments.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// One fragment of a tool call. A single logical call is spread across
/// many chunks sharing the same `index`; its `arguments` field arrives as
/// partial JSON text that is only valid after concatenation in arrival
/// order.
#[derive(Clone, Debug, Deserialize)]
pub struct ToolCallDelta {
    /// Stream index identifying which call this fragment belongs to.
    pub index: u32,
    /// Upstream call id, usually only on the first fragment.
    #[serde(default)]
    pub id: Option<String>,
    /// Type tag, usually only on the first fragment.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Partial function name/arguments.
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

/// Partial function payload of a tool-call fragment.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FunctionDelta {
    /// Function name fragment.
    #[serde(default)]
    pub name: Option<String>,
    /// Arguments text fragment.
    #[serde(default)]
    pub arguments: Option<String>,
}
