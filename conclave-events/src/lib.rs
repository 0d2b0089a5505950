//! Conclave Events - Observable Trace Log
//!
//! An append-only log of [`TraceEvent`]s with observer fan-out. Brokers
//! record interaction events through the [`TraceSink`] seam; UI collaborators
//! register observers to repaint trace panes as events arrive.
//!
//! Guarantees:
//! - Append order is preserved; events are never mutated or removed.
//! - Observers fire synchronously on every append, in registration order.
//! - A panicking observer cannot corrupt the log or starve later observers.
//! - Registration never replays past events; callers wanting history read
//!   `events()` separately.

use conclave_core::{TraceEvent, TraceSink};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Observer = Arc<dyn Fn(&TraceEvent) + Send + Sync>;

/// Append-only trace event log with synchronous observer fan-out.
pub struct TraceCollector {
    events: Mutex<Vec<TraceEvent>>,
    observers: Mutex<Vec<Observer>>,
}

impl TraceCollector {
    /// Create an empty collector with no observers.
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Append an event and notify every observer with it, in registration
    /// order. No lock is held while observers run, so an observer may read
    /// `events()` or register further observers without deadlocking.
    pub fn append(&self, event: TraceEvent) {
        lock(&self.events).push(event.clone());

        let observers: Vec<Observer> = lock(&self.observers).clone();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
                tracing::warn!(event = %event.summary(), "trace observer panicked");
            }
        }
    }

    /// Register an observer called on every future append. Past events are
    /// not replayed.
    pub fn observe(&self, observer: impl Fn(&TraceEvent) + Send + Sync + 'static) {
        lock(&self.observers).push(Arc::new(observer));
    }

    /// Ordered snapshot of all events appended so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        lock(&self.events).clone()
    }

    /// Number of events appended so far.
    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    /// Whether no event has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TraceCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for TraceCollector {
    fn record(&self, event: TraceEvent) {
        self.append(event);
    }
}

impl std::fmt::Debug for TraceCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceCollector")
            .field("events", &self.len())
            .field("observers", &lock(&self.observers).len())
            .finish()
    }
}

// The log and observer list stay valid across an observer panic; recover
// the guard rather than propagating poison.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
