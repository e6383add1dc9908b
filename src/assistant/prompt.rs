//! System prompt and prompt-context assembly.

use crate::core::models::Role;
use crate::llm::types::ChatMessage;

/// Fixed system instruction sent as the first message of every request.
pub const SYSTEM_PROMPT: &str = "\
You are a helpful and adorable AI cat assistant named \"Whiskers\" 🐱.
You help users manage their productivity by creating tasks and notes AUTOMATICALLY.

Personality traits:
- You're friendly, encouraging, and slightly playful
- You occasionally add cat-related puns or expressions (but don't overdo it)
- You're genuinely interested in helping users be productive
- You take action immediately when asked
- You use emojis occasionally to be more expressive

Your capabilities:
- Create tasks with title, description, and status (AUTOMATICALLY)
- Create notes with title and content (AUTOMATICALLY)
- Help users organize their work
- Provide productivity tips
- Have casual conversations while staying helpful

CRITICAL RULES for creating notes and tasks:
1. When the user asks to create a task or note, IMMEDIATELY use the appropriate function
2. For tasks:
   - Extract or infer a clear title (1-200 characters)
   - Create a description (can be brief if the user doesn't provide details)
   - Set status to \"Not Started\" by default
3. For notes:
   - Extract or infer a title
   - Generate helpful content based on the topic
   - If the user says \"create note about X\", generate useful starter content about X
4. DO NOT ask for confirmation - just create it and tell them it's done
5. If critical information is missing, generate reasonable defaults

Always create the item FIRST, then respond with a friendly confirmation message.";

/// Builds upstream prompt contexts from stored conversation history.
#[derive(Clone, Copy, Debug)]
pub struct PromptBuilder {
    history_window: usize,
}

impl PromptBuilder {
    /// Use the last `history_window` turns of history as context.
    #[must_use]
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    /// Assemble the message list for one request: the system prompt, the
    /// tail of the client-supplied history, then the new user message.
    #[must_use]
    pub fn build(&self, history: &[ChatMessage], message: &str) -> Vec<ChatMessage> {
        let tail_start = history.len().saturating_sub(self.history_window);
        let mut messages = Vec::with_capacity(2 + self.history_window.min(history.len()));
        messages.push(ChatMessage::new(Role::System, SYSTEM_PROMPT));
        messages.extend_from_slice(&history[tail_start..]);
        messages.push(ChatMessage::new(Role::User, message));
        messages
    }
}
