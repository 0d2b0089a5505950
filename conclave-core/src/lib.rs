//! Conclave Core - Shared Data Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types and the error taxonomy - no business
//! logic, no I/O.

mod chat;
mod error;
mod trace;

pub use chat::{AgentStatus, ChatMessage, ChatRole, GatewayKind};
pub use error::{
    ConclaveError, ConclaveResult, ConfigError, DispatchError, NotFoundError, ProviderError,
};
pub use trace::{NullTraceSink, TraceEvent, TraceSink};
