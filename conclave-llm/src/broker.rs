//! Broker binding a gateway connection to a model and a trace sink

use crate::ChatGateway;
use conclave_core::{ChatMessage, ConclaveResult, GatewayKind, TraceEvent, TraceSink};
use std::sync::Arc;

/// Binds (gateway connection, model identifier, trace sink). Every
/// completion that flows through is recorded as trace events around the
/// gateway call. Cheap to clone; all fields are shared handles.
#[derive(Clone)]
pub struct Broker {
    gateway: Arc<dyn ChatGateway>,
    model: String,
    tracer: Arc<dyn TraceSink>,
}

impl Broker {
    /// Create a broker bound to a gateway and model.
    ///
    /// # Arguments
    /// * `gateway` - Resolved gateway connection
    /// * `model` - Model identifier to complete against
    /// * `tracer` - Sink receiving interaction records
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        model: impl Into<String>,
        tracer: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            gateway,
            model: model.into(),
            tracer,
        }
    }

    /// The model this broker completes against.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Which backend the underlying gateway talks to.
    pub fn gateway_kind(&self) -> GatewayKind {
        self.gateway.kind()
    }

    /// Submit a transcript, recording call and outcome to the trace sink.
    pub async fn complete(&self, transcript: &[ChatMessage]) -> ConclaveResult<String> {
        let gateway = self.gateway.kind();
        self.tracer.record(TraceEvent::LlmCall {
            gateway,
            model: self.model.clone(),
            messages: transcript.len(),
        });

        match self.gateway.complete(&self.model, transcript).await {
            Ok(content) => {
                self.tracer.record(TraceEvent::LlmResponse {
                    gateway,
                    model: self.model.clone(),
                    content: content.clone(),
                });
                Ok(content)
            }
            Err(err) => {
                self.tracer.record(TraceEvent::LlmFailure {
                    gateway,
                    model: self.model.clone(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("gateway", &self.gateway.kind())
            .field("model", &self.model)
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
