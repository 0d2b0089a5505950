//! Conversation handle: an ordered message log with a send operation

use crate::Broker;
use conclave_core::{ChatMessage, ConclaveResult};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ordered message log bound to a broker. Message 0 is always the system
/// prompt; history views start from message 1.
///
/// The log lock is never held across an await, so readers stay responsive
/// while a completion is in flight.
pub struct Conversation {
    broker: Broker,
    log: Mutex<Vec<ChatMessage>>,
}

impl Conversation {
    /// Create a conversation seeded with the system prompt.
    pub fn new(broker: Broker, system_prompt: impl Into<String>) -> Self {
        Self {
            broker,
            log: Mutex::new(vec![ChatMessage::system(system_prompt)]),
        }
    }

    /// The broker this conversation sends through.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Append a user message, complete the transcript through the broker,
    /// and append the assistant reply.
    ///
    /// On failure the user message stays in the log and the error is
    /// returned; the caller decides whether to retry.
    pub async fn send(&self, text: &str) -> ConclaveResult<String> {
        let transcript = {
            let mut log = self.log();
            log.push(ChatMessage::user(text));
            log.clone()
        };

        let reply = self.broker.complete(&transcript).await?;
        self.log().push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    /// Every message except the system prompt, in order.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.log().iter().skip(1).cloned().collect()
    }

    /// Full snapshot of the log, system prompt included.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log().clone()
    }

    /// Number of messages in the log, system prompt included.
    pub fn message_count(&self) -> usize {
        self.log().len()
    }

    // A poisoned log is still a valid log; the push/clone operations in
    // here cannot leave it half-written.
    fn log(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("broker", &self.broker)
            .field("messages", &self.message_count())
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
