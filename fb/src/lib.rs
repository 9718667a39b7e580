//! fifobell - external-trigger broadcast coordinator
//!
//! An external process writes to a one-shot named pipe; fifobell turns each
//! such write into one broadcast that wakes a fixed pool of worker threads.
//!
//! # Core Concepts
//!
//! - **One channel per trigger**: every cycle provisions a fresh FIFO in a
//!   private temp dir and removes it after one connection
//! - **Broadcast wake**: a mutex/condvar event with a generation counter, so
//!   no worker ever busy-polls and none misses a broadcast
//! - **Backpressure**: the processing delay runs before the next channel
//!   exists, so at most one trigger is outstanding
//! - **Cooperative shutdown**: one token cancels the trigger wait, the delay
//!   and every parked worker
//!
//! # Modules
//!
//! - [`broadcast`] - The shared broadcast event
//! - [`channel`] - FIFO provisioning, draining, announcing and writing
//! - [`trigger`] - The trigger ingestion loop
//! - [`worker`] - Broadcast consumers and fanout policies
//! - [`runtime`] - Thread wiring and orderly shutdown
//! - [`events`] - Status events and the console printer
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod broadcast;
pub mod channel;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod runtime;
pub mod shutdown;
pub mod trigger;
pub mod worker;

// Re-export commonly used types
pub use broadcast::{BroadcastEvent, Closed};
pub use channel::{Channel, Listener, fire};
pub use config::{ChannelConfig, Config};
pub use error::{RuntimeError, TriggerError};
pub use events::{ConsolePrinter, Event, EventBus, EventEmitter};
pub use runtime::{RunSummary, Runtime, RuntimeConfig, Stopper};
pub use shutdown::{Cancelled, Shutdown};
pub use trigger::{TriggerConfig, TriggerLoop, TriggerStats};
pub use worker::{FanoutPolicy, Worker, WorkerStats};
