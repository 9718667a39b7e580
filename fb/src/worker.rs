//! Broadcast consumers
//!
//! A worker parks on the shared [`BroadcastEvent`], performs its unit of work
//! (reporting completion) when a broadcast arrives, and re-arms. Which
//! workers do work for a given broadcast is decided by the [`FanoutPolicy`].
//! No policy ever polls the flag in a loop: between broadcasts every worker
//! is parked on the event's condition variable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::broadcast::{BroadcastEvent, Closed};
use crate::events::EventEmitter;

/// Rule deciding which workers perform work for one broadcast
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutPolicy {
    /// Every worker works exactly once per broadcast (generation cursor)
    #[default]
    Broadcast,
    /// Observe the flag, work, clear it; one to N workers per broadcast
    Shared,
    /// Exactly one worker per broadcast
    Exclusive,
}

impl std::str::FromStr for FanoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "broadcast" | "all" => Ok(Self::Broadcast),
            "shared" => Ok(Self::Shared),
            "exclusive" | "one" => Ok(Self::Exclusive),
            _ => Err(format!(
                "Unknown fanout policy: {}. Use: broadcast, shared, or exclusive",
                s
            )),
        }
    }
}

impl std::fmt::Display for FanoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast => write!(f, "broadcast"),
            Self::Shared => write!(f, "shared"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// What a worker did before it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: usize,
    pub completed: u64,
}

/// One consumer of the broadcast event
pub struct Worker {
    id: usize,
    event: Arc<BroadcastEvent>,
    policy: FanoutPolicy,
    emitter: EventEmitter,
    last_seen: u64,
    completed: u64,
}

impl Worker {
    /// Create a worker that reacts to broadcasts signaled after this call
    pub fn new(id: usize, event: Arc<BroadcastEvent>, policy: FanoutPolicy, emitter: EventEmitter) -> Self {
        let last_seen = event.generation();
        debug!(id, %policy, last_seen, "Worker::new: called");
        Self {
            id,
            event,
            policy,
            emitter,
            last_seen,
            completed: 0,
        }
    }

    /// Consume broadcasts until the event is closed
    pub fn run(mut self) -> WorkerStats {
        info!(worker = self.id, policy = %self.policy, "Worker started");
        self.emitter.worker_waiting(self.id);

        let result = match self.policy {
            FanoutPolicy::Broadcast => self.run_broadcast(),
            FanoutPolicy::Shared => self.run_shared(),
            FanoutPolicy::Exclusive => self.run_exclusive(),
        };
        debug!(worker = self.id, ?result, "Worker::run: loop exited");

        info!(worker = self.id, completed = self.completed, "Worker stopped");
        self.emitter.worker_stopped(self.id, self.completed);
        WorkerStats {
            id: self.id,
            completed: self.completed,
        }
    }

    fn run_broadcast(&mut self) -> Result<(), Closed> {
        loop {
            let current = self.event.wait_for_generation(self.last_seen)?;
            // Several broadcasts may have landed while the last one was worked
            for generation in (self.last_seen + 1)..=current {
                self.work(generation);
            }
            self.last_seen = current;
            self.event.clear();
        }
    }

    // A worker that loses the race to clear() finds the flag false and parks
    // in wait() again.
    fn run_shared(&mut self) -> Result<(), Closed> {
        loop {
            self.event.wait()?;
            let generation = self.event.generation();
            self.work(generation);
            self.event.clear();
        }
    }

    fn run_exclusive(&mut self) -> Result<(), Closed> {
        loop {
            self.event.wait()?;
            let generation = self.event.generation();
            if self.event.take() {
                self.work(generation);
            } else {
                debug!(worker = self.id, generation, "Worker: broadcast taken by another worker");
            }
        }
    }

    fn work(&mut self, generation: u64) {
        self.completed += 1;
        info!(worker = self.id, generation, "Received signal, work completed");
        self.emitter.worker_completed(self.id, generation);
    }
}
