//! Trace events and the sink seam between brokers and the collector

use crate::GatewayKind;
use serde::{Deserialize, Serialize};

/// A record of one LLM interaction. Append order is the only ordering
/// guarantee; no timestamps are defined at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// A transcript was submitted to a gateway.
    LlmCall {
        gateway: GatewayKind,
        model: String,
        /// Number of messages in the submitted transcript
        messages: usize,
    },
    /// A gateway returned a completion.
    LlmResponse {
        gateway: GatewayKind,
        model: String,
        content: String,
    },
    /// A gateway call failed.
    LlmFailure {
        gateway: GatewayKind,
        model: String,
        error: String,
    },
}

impl TraceEvent {
    /// One-line rendering for log panes.
    pub fn summary(&self) -> String {
        match self {
            TraceEvent::LlmCall {
                gateway,
                model,
                messages,
            } => format!("call {}/{} ({} messages)", gateway, model, messages),
            TraceEvent::LlmResponse {
                gateway,
                model,
                content,
            } => format!("response {}/{} ({} chars)", gateway, model, content.len()),
            TraceEvent::LlmFailure {
                gateway,
                model,
                error,
            } => format!("failure {}/{}: {}", gateway, model, error),
        }
    }
}

/// Recipient of broker-level interaction records. The broker only constructs
/// events and passes them through; it never reads them back.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent);
}

/// Sink that discards every event. Useful for tests and for brokers that
/// run without a collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn record(&self, _event: TraceEvent) {}
}

// =============================================================================
// TESTS
// =============================================================================
