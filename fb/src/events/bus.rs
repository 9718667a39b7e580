//! Event Bus - central pub/sub system for fifobell events
//!
//! The EventBus uses a tokio broadcast channel. Sending never blocks and
//! works from plain OS threads, so the worker and trigger threads emit
//! directly; the console printer subscribes from the async side.

use std::path::Path;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::Event;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Central event bus for fifobell activity
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter handle labelled with `source` in debug logs
    pub fn emitter_for(&self, source: impl Into<String>) -> EventEmitter {
        let source = source.into();
        debug!(%source, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            source,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for components to emit events without owning the bus
///
/// Holds a sender clone; the bus's receivers see `Closed` only after every
/// emitter has been dropped.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<Event>,
    source: String,
}

impl EventEmitter {
    /// Send to every subscriber; with none the event is dropped
    fn emit(&self, event: Event) {
        debug!(source = %self.source, event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    pub fn worker_waiting(&self, worker: usize) {
        self.emit(Event::WorkerWaiting { worker });
    }

    pub fn worker_completed(&self, worker: usize, generation: u64) {
        self.emit(Event::WorkerCompleted { worker, generation });
    }

    pub fn worker_stopped(&self, worker: usize, completed: u64) {
        self.emit(Event::WorkerStopped { worker, completed });
    }

    pub fn channel_ready(&self, seq: u64, path: &Path) {
        self.emit(Event::ChannelReady {
            seq,
            path: path.to_path_buf(),
        });
    }

    pub fn channel_drained(&self, seq: u64, bytes: usize) {
        self.emit(Event::ChannelDrained { seq, bytes });
    }

    pub fn signaled(&self, seq: u64, generation: u64) {
        self.emit(Event::Signaled { seq, generation });
    }

    pub fn channel_removed(&self, seq: u64, path: &Path) {
        self.emit(Event::ChannelRemoved {
            seq,
            path: path.to_path_buf(),
        });
    }

    pub fn trigger_stopped(&self, triggers: u64) {
        self.emit(Event::TriggerStopped { triggers });
    }
}
