//! Synchronous event notifier.
//!
//! Listeners are called in registration order, on the caller's thread,
//! after the work that produced the event has completed. A listener that
//! returns an error (or panics) is logged and skipped; delivery to the
//! remaining listeners continues and the caller is never interrupted.
//!
//! The bus also keeps a bounded [`EventLog`] of recent events for debug
//! consoles.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::error;

use crate::history::{RingBuffer, RingBufferIter};
use crate::id::{ComponentId, ListenerId, NodeId, TerminalRef};
use crate::sim::StepStats;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulator event. Lifecycle events carry the simulated time at which
/// they occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // -- Lifecycle --
    SimulationStarted { time: f64 },
    SimulationPaused { time: f64 },
    SimulationResumed { time: f64 },
    SimulationStopped { time: f64 },
    SimulationReset,
    SimulationUpdated(StepStats),

    // -- Topology --
    CircuitBuilt {
        nodes: usize,
        components: usize,
        ground: Option<NodeId>,
    },
    ComponentAdded { component: ComponentId },
    ComponentRemoved { component: ComponentId },
    ConnectionAdded { from: TerminalRef, to: TerminalRef },
    ConnectionRemoved { from: TerminalRef, to: TerminalRef },
}

/// Discriminant tag for event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SimulationStarted,
    SimulationPaused,
    SimulationResumed,
    SimulationStopped,
    SimulationReset,
    SimulationUpdated,
    CircuitBuilt,
    ComponentAdded,
    ComponentRemoved,
    ConnectionAdded,
    ConnectionRemoved,
}

impl Event {
    /// The discriminant tag, for filtering without matching payloads.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::SimulationStarted { .. } => EventKind::SimulationStarted,
            Event::SimulationPaused { .. } => EventKind::SimulationPaused,
            Event::SimulationResumed { .. } => EventKind::SimulationResumed,
            Event::SimulationStopped { .. } => EventKind::SimulationStopped,
            Event::SimulationReset => EventKind::SimulationReset,
            Event::SimulationUpdated(_) => EventKind::SimulationUpdated,
            Event::CircuitBuilt { .. } => EventKind::CircuitBuilt,
            Event::ComponentAdded { .. } => EventKind::ComponentAdded,
            Event::ComponentRemoved { .. } => EventKind::ComponentRemoved,
            Event::ConnectionAdded { .. } => EventKind::ConnectionAdded,
            Event::ConnectionRemoved { .. } => EventKind::ConnectionRemoved,
        }
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// The most recent events, oldest dropped first, plus a count of every
/// event ever logged.
#[derive(Debug)]
pub struct EventLog {
    ring: RingBuffer<Event>,
    /// Total events ever written (including dropped).
    total_written: u64,
}

impl EventLog {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity.max(1)),
            total_written: 0,
        }
    }

    /// Append an event, dropping the oldest if the log is full.
    pub fn push(&mut self, event: Event) {
        self.ring.push(event);
        self.total_written += 1;
    }

    /// Maximum number of events retained.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Number of events currently retained.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total events ever pushed, including those since dropped. Not reset
    /// by [`clear`](Self::clear).
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Number of events that were dropped because the log was full.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> RingBufferIter<'_, Event> {
        self.ring.iter()
    }

    /// Forget the retained events. The written total is kept.
    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Failure reported by a listener. Logged by the bus, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A listener receives the event kind and the event itself.
pub type Listener = Box<dyn FnMut(EventKind, &Event) -> Result<(), ListenerError>>;

struct ListenerEntry {
    id: ListenerId,
    listener: Listener,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("id", &self.id)
            .field("listener", &"<fn>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Ordered listener registry plus the recent-event log.
#[derive(Debug)]
pub struct EventBus {
    listeners: Vec<ListenerEntry>,
    log: EventLog,
    next_listener: u64,
    failures: u64,
}

impl EventBus {
    /// An empty bus whose log keeps `log_capacity` events.
    pub fn new(log_capacity: usize) -> Self {
        Self {
            listeners: Vec::new(),
            log: EventLog::new(log_capacity),
            next_listener: 0,
            failures: 0,
        }
    }

    /// Register a listener. It will be called after every listener
    /// registered before it.
    pub fn subscribe(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push(ListenerEntry { id, listener });
        id
    }

    /// Returns `false` if no listener has this id.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|entry| entry.id != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver an event to every listener in registration order.
    pub fn notify(&mut self, event: Event) {
        let kind = event.kind();
        for entry in &mut self.listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.listener)(kind, &event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.failures += 1;
                    error!(listener = entry.id.0, ?kind, error = %err, "event listener failed");
                }
                Err(_) => {
                    self.failures += 1;
                    error!(listener = entry.id.0, ?kind, "event listener panicked");
                }
            }
        }
        self.log.push(event);
    }

    /// Recently emitted events, oldest first.
    pub fn recent(&self) -> &EventLog {
        &self.log
    }

    /// Number of listener calls that failed since creation.
    pub fn failure_count(&self) -> u64 {
        self.failures
    }
}

// ===========================================================================
// Tests
// ===========================================================================
