//! Ollama API request and response types

use conclave_core::ChatMessage;
use serde::{Deserialize, Serialize};

// ============================================================================
// CHAT TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

// ============================================================================
// MODEL TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListModelsResponse {
    pub models: Vec<ModelInfo>,
}

// =============================================================================
// TESTS
// =============================================================================
