//! LLM gateway implementations
//!
//! This module contains concrete implementations of the ChatGateway trait
//! for the supported backends.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaGateway;
pub use openai::OpenAiGateway;

use conclave_core::{ConclaveError, ProviderError};

pub(crate) fn request_failed(
    provider: &str,
    status: i32,
    message: impl Into<String>,
) -> ConclaveError {
    ProviderError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    }
    .into()
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> ConclaveError {
    ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
    .into()
}
