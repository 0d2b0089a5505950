//! Chat primitives: gateway kinds, agent status, message roles

use serde::{Deserialize, Serialize};

// ============================================================================
// ENUMS
// ============================================================================

/// Which LLM provider backend an agent talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayKind {
    /// OpenAI cloud API (requires an API key)
    OpenAi,
    /// Local Ollama server
    Ollama,
}

impl GatewayKind {
    /// Lowercase provider label used in errors and trace events.
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::OpenAi => "openai",
            GatewayKind::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an agent. `Working` is held for exactly the duration of one
/// in-flight send; the dispatcher rejects a second send while it is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    /// Agent is idle and available to take a message
    Idle,
    /// Agent has a send in flight
    Working,
}

/// Role of a chat message. Serialized lowercase to match both the OpenAI
/// and Ollama chat wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

// ============================================================================
// CHAT MESSAGE
// ============================================================================

/// One entry in a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message (always message 0 of a conversation).
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
