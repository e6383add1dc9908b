//! The Whiskers assistant: tool declarations, execution, tool-call
//! reassembly, and the per-request chat session.

pub mod accumulator;
pub mod executor;
pub mod pending;
pub mod prompt;
pub mod registry;
pub mod session;

pub use accumulator::ToolCallAccumulator;
pub use executor::ToolExecutor;
pub use pending::{PendingToolCalls, TakeError};
pub use prompt::PromptBuilder;
pub use registry::ToolRegistry;
pub use session::{ChatEvent, ChatResponse, ChatSession};
