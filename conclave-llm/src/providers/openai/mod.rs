//! OpenAI chat gateway implementation

pub mod types;

use self::types::{ApiError, CompletionRequest, CompletionResponse, ModelsResponse};
use crate::providers::{invalid_response, request_failed};
use crate::ChatGateway;
use conclave_core::{ChatMessage, ConclaveResult, GatewayKind};
use reqwest::Client;

const PROVIDER: &str = "openai";

/// Chat gateway for the OpenAI API (or any compatible endpoint).
pub struct OpenAiGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiGateway {
    /// Create a gateway against an OpenAI-compatible endpoint.
    ///
    /// # Arguments
    /// * `base_url` - API base (e.g., "https://api.openai.com/v1")
    /// * `api_key` - Bearer token for authentication
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    async fn read_error(response: reqwest::Response) -> conclave_core::ConclaveError {
        let status = response.status().as_u16() as i32;
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = if let Ok(api_error) = serde_json::from_str::<ApiError>(&error_text) {
            api_error.error.message
        } else {
            error_text
        };

        request_failed(PROVIDER, status, message)
    }
}

#[async_trait::async_trait]
impl ChatGateway for OpenAiGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::OpenAi
    }

    async fn complete(&self, model: &str, transcript: &[ChatMessage]) -> ConclaveResult<String> {
        let request = CompletionRequest {
            model: model.to_string(),
            messages: transcript.to_vec(),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| invalid_response(PROVIDER, "Completion contained no choices"))
    }

    async fn list_models(&self) -> ConclaveResult<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse models list: {}", e)))?;

        Ok(models.data.into_iter().map(|entry| entry.id).collect())
    }
}

impl std::fmt::Debug for OpenAiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGateway")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
