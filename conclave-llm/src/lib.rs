//! Conclave LLM - Gateway Abstraction Layer
//!
//! Provider-agnostic chat gateway trait, the resolver that turns a gateway
//! kind into a live connection, and the broker/conversation pair that agents
//! talk through. Concrete providers live under `providers/`.

use conclave_core::{ChatMessage, ConclaveError, ConclaveResult, GatewayKind};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

mod broker;
mod conversation;
pub mod providers;

pub use broker::Broker;
pub use conversation::Conversation;
pub use providers::{OllamaGateway, OpenAiGateway};

/// Environment variable holding the OpenAI API key.
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";

// ============================================================================
// CHAT GATEWAY TRAIT
// ============================================================================

/// A connection to one LLM backend. Implementations must be thread-safe
/// (Send + Sync) since completions run on detached dispatch tasks.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    /// Which backend this gateway talks to.
    fn kind(&self) -> GatewayKind;

    /// Submit a full transcript and return the assistant completion.
    ///
    /// # Arguments
    /// * `model` - Model identifier (e.g., "gpt-4o", "llama3")
    /// * `transcript` - Ordered messages, system prompt first
    ///
    /// # Returns
    /// * `Ok(String)` - The assistant reply text
    /// * `Err(ConclaveError::Provider)` - On transport or model failure
    async fn complete(&self, model: &str, transcript: &[ChatMessage]) -> ConclaveResult<String>;

    /// List the model identifiers this backend currently serves.
    async fn list_models(&self) -> ConclaveResult<Vec<String>>;
}

// ============================================================================
// GATEWAY RESOLVER
// ============================================================================

/// Turns a gateway kind into a live connection handle.
///
/// Configuration is explicit constructor state; only `from_env()` touches the
/// environment. Overrides registered per kind take precedence over the real
/// providers, which is how tests substitute a [`MockChatGateway`].
pub struct GatewayResolver {
    openai_base: String,
    openai_api_key: Option<String>,
    ollama_base: String,
    overrides: RwLock<HashMap<GatewayKind, Arc<dyn ChatGateway>>>,
}

impl GatewayResolver {
    /// Create a resolver with explicit configuration.
    ///
    /// # Arguments
    /// * `openai_base` - OpenAI-compatible API base URL
    /// * `openai_api_key` - API key, or None when unconfigured
    /// * `ollama_base` - Ollama server URL (e.g., "http://localhost:11434")
    pub fn new(
        openai_base: impl Into<String>,
        openai_api_key: Option<String>,
        ollama_base: impl Into<String>,
    ) -> Self {
        Self {
            openai_base: openai_base.into(),
            openai_api_key: openai_api_key.filter(|key| !key.is_empty()),
            ollama_base: ollama_base.into(),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Create a resolver from `OPENAI_BASE_URL`, `OPENAI_API_KEY`, and
    /// `OLLAMA_HOST`, with the usual defaults for the base URLs.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_OPENAI_BASE.to_string()),
            std::env::var(OPENAI_API_KEY_VAR).ok(),
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_BASE.to_string()),
        )
    }

    /// Register a gateway that resolves for `kind` instead of the real
    /// provider. Replaces any previously registered override.
    pub fn register(&self, kind: GatewayKind, gateway: Arc<dyn ChatGateway>) {
        if let Ok(mut overrides) = self.overrides.write() {
            overrides.insert(kind, gateway);
        }
    }

    /// Resolve a connection handle for a gateway kind.
    ///
    /// # Returns
    /// * `Ok(Arc<dyn ChatGateway>)` - A live connection
    /// * `Err(ConclaveError::Config)` - When required credentials are absent
    pub fn resolve(&self, kind: GatewayKind) -> ConclaveResult<Arc<dyn ChatGateway>> {
        if let Ok(overrides) = self.overrides.read() {
            if let Some(gateway) = overrides.get(&kind) {
                return Ok(gateway.clone());
            }
        }

        match kind {
            GatewayKind::OpenAi => {
                let api_key = self
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| ConclaveError::missing_api_key(OPENAI_API_KEY_VAR))?;
                Ok(Arc::new(OpenAiGateway::new(&self.openai_base, api_key)))
            }
            GatewayKind::Ollama => Ok(Arc::new(OllamaGateway::new(&self.ollama_base))),
        }
    }

    /// List available models for a gateway kind, propagating failures.
    pub async fn list_models(&self, kind: GatewayKind) -> ConclaveResult<Vec<String>> {
        self.resolve(kind)?.list_models().await
    }
}

impl std::fmt::Debug for GatewayResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayResolver")
            .field("openai_base", &self.openai_base)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("ollama_base", &self.ollama_base)
            .finish()
    }
}

// ============================================================================
// MOCK GATEWAY FOR TESTING
// ============================================================================

/// Mock chat gateway with a scripted reply queue.
///
/// When the queue is empty it echoes the last user message, so simple tests
/// need no scripting at all. An optional delay keeps a send in flight long
/// enough to observe the Working status from another task.
pub struct MockChatGateway {
    kind: GatewayKind,
    models: Vec<String>,
    delay: Option<Duration>,
    replies: Mutex<VecDeque<ConclaveResult<String>>>,
    transcripts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChatGateway {
    /// Create a mock gateway reporting the given kind.
    pub fn new(kind: GatewayKind) -> Self {
        Self {
            kind,
            models: vec!["mock-model".to_string()],
            delay: None,
            replies: Mutex::new(VecDeque::new()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// Set the model list reported by `list_models`.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Delay every completion, keeping sends observably in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue the outcome of the next completion.
    pub fn push_reply(&self, reply: ConclaveResult<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Every transcript this gateway was called with, in call order.
    pub fn transcripts(&self) -> Vec<Vec<ChatMessage>> {
        self.transcripts
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self, transcript: &[ChatMessage]) -> ConclaveResult<String> {
        if let Ok(mut replies) = self.replies.lock() {
            if let Some(reply) = replies.pop_front() {
                return reply;
            }
        }
        let last_user = transcript
            .iter()
            .rev()
            .find(|m| m.role == conclave_core::ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        Ok(format!("echo: {}", last_user))
    }
}

#[async_trait::async_trait]
impl ChatGateway for MockChatGateway {
    fn kind(&self) -> GatewayKind {
        self.kind
    }

    async fn complete(&self, _model: &str, transcript: &[ChatMessage]) -> ConclaveResult<String> {
        if let Ok(mut transcripts) = self.transcripts.lock() {
            transcripts.push(transcript.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_reply(transcript)
    }

    async fn list_models(&self) -> ConclaveResult<Vec<String>> {
        Ok(self.models.clone())
    }
}

impl std::fmt::Debug for MockChatGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChatGateway")
            .field("kind", &self.kind)
            .field("models", &self.models)
            .field("delay", &self.delay)
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
