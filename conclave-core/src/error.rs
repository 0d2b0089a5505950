//! Error types for Conclave operations

use thiserror::Error;

/// Configuration errors: missing credentials, agents without a live
/// conversation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API key not found in environment variable {var}")]
    MissingApiKey { var: String },

    #[error("Agent {agent} has no live conversation")]
    ConversationMissing { agent: String },
}

/// Index lookups that failed on a mutating call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Goal not found at index {index}")]
    Goal { index: usize },

    #[error("Task not found at index {index} of goal {goal}")]
    Task { goal: usize, index: usize },
}

/// LLM gateway errors raised during a send or model listing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Dispatch rejections from the enforced status lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Agent {agent} is already working on a message")]
    AgentBusy { agent: String },
}

/// Master error type for all Conclave errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConclaveError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl ConclaveError {
    /// Missing-credential error for a gateway kind, naming the env var.
    pub fn missing_api_key(var: impl Into<String>) -> Self {
        ConfigError::MissingApiKey { var: var.into() }.into()
    }
}

/// Result type alias for Conclave operations.
pub type ConclaveResult<T> = Result<T, ConclaveError>;

// =============================================================================
// TESTS
// =============================================================================


// =============================================================================
// PROPERTY-BASED TESTS
// =============================================================================
