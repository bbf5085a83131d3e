//! Conversation messages exchanged with the driver LLM.
//!
//! There is no content-block enum here: no text/tool-use/tool-result/image
//! variants for OpenAI-style function calling. The RLM driver conversation
//! is plain text only: the model emits prose and fenced code blocks, never
//! a structured tool call. Delegation happens through the sandboxed
//! `llm_query` callback, not function-calling, so there is nothing here to
//! model beyond role+text.

use serde::{Deserialize, Serialize};

/// Who sent a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// The string used on the wire for OpenAI-compatible chat completion
    /// requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// A single turn in the driver LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Result of one driver LLM completion: the external adapter contract,
/// rendered as a Rust struct.
#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmCompletion {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, MessageRole::System);
        assert_eq!(Message::user("u").role, MessageRole::User);
        assert_eq!(Message::assistant("a").role, MessageRole::Assistant);
    }

    #[test]
    fn test_completion_total_tokens() {
        let c = LlmCompletion {
            content: "hi".into(),
            prompt_tokens: 10,
            completion_tokens: 5,
        };
        assert_eq!(c.total_tokens(), 15);
    }
}
