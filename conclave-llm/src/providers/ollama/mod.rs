//! Ollama chat gateway implementation (local models)

pub mod types;

use self::types::{ChatRequest, ChatResponse, ListModelsResponse};
use crate::providers::{invalid_response, request_failed};
use crate::ChatGateway;
use conclave_core::{ChatMessage, ConclaveResult, GatewayKind};
use reqwest::Client;

const PROVIDER: &str = "ollama";

/// Chat gateway for a local Ollama server. No credentials required.
pub struct OllamaGateway {
    client: Client,
    base_url: String,
}

impl OllamaGateway {
    /// Create a gateway against an Ollama server.
    ///
    /// # Arguments
    /// * `base_url` - Server URL (e.g., "http://localhost:11434")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl ChatGateway for OllamaGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Ollama
    }

    async fn complete(&self, model: &str, transcript: &[ChatMessage]) -> ConclaveResult<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: transcript.to_vec(),
            stream: false,
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(request_failed(PROVIDER, status.as_u16() as i32, error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)))?;

        Ok(chat.message.content)
    }

    async fn list_models(&self) -> ConclaveResult<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("Failed to connect to Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(request_failed(PROVIDER, status.as_u16() as i32, error_text));
        }

        let list: ListModelsResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse models list: {}", e)))?;

        Ok(list.models.into_iter().map(|m| m.name).collect())
    }
}

impl std::fmt::Debug for OllamaGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaGateway")
            .field("base_url", &self.base_url)
            .finish()
    }
}
