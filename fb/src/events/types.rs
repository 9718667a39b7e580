//! Event types for fifobell activity
//!
//! These events represent all observable activity:
//! - Worker lifecycle (waiting, work completed, stopped)
//! - Channel lifecycle (ready, drained, removed)
//! - Broadcasts (signaled)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Core event enum - the vocabulary of fifobell activity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // === Workers ===
    /// A worker has started and is parked on the broadcast event
    WorkerWaiting { worker: usize },
    /// A worker performed its unit of work for one broadcast
    WorkerCompleted { worker: usize, generation: u64 },
    /// A worker exited
    WorkerStopped { worker: usize, completed: u64 },

    // === Trigger loop ===
    /// A fresh channel is listening for a writer
    ChannelReady { seq: u64, path: PathBuf },
    /// The writer closed its end; the processing delay starts now
    ChannelDrained { seq: u64, bytes: usize },
    /// The broadcast event was signaled
    Signaled { seq: u64, generation: u64 },
    /// The channel and its directory were removed
    ChannelRemoved { seq: u64, path: PathBuf },
    /// The trigger loop exited
    TriggerStopped { triggers: u64 },
}

impl Event {
    /// Short name used in logs
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::WorkerWaiting { .. } => "worker_waiting",
            Event::WorkerCompleted { .. } => "worker_completed",
            Event::WorkerStopped { .. } => "worker_stopped",
            Event::ChannelReady { .. } => "channel_ready",
            Event::ChannelDrained { .. } => "channel_drained",
            Event::Signaled { .. } => "signaled",
            Event::ChannelRemoved { .. } => "channel_removed",
            Event::TriggerStopped { .. } => "trigger_stopped",
        }
    }

    /// Human readable status line
    pub fn status_line(&self) -> String {
        match self {
            Event::WorkerWaiting { worker } => {
                format!("Worker {} started. Waiting for the signal...", worker)
            }
            Event::WorkerCompleted { worker, generation } => {
                format!("Received signal #{}. Worker {} completed.", generation, worker)
            }
            Event::WorkerStopped { worker, completed } => {
                format!("Worker {} stopped after {} signal(s).", worker, completed)
            }
            Event::ChannelReady { path, .. } => format!("Listening on {}", path.display()),
            Event::ChannelDrained { bytes, .. } => {
                format!("Trigger received ({} bytes). Processing...", bytes)
            }
            Event::Signaled { generation, .. } => format!("Broadcast #{} sent.", generation),
            Event::ChannelRemoved { path, .. } => format!("Removed {}", path.display()),
            Event::TriggerStopped { triggers } => {
                format!("Trigger loop stopped after {} trigger(s).", triggers)
            }
        }
    }
}
