//! Event bus for observability
//!
//! Every component reports what it is doing as an [`Event`]. The console
//! printer subscribes and renders status lines; tests subscribe to assert on
//! ordering. Events are informational only and carry no synchronization
//! meaning.
//!
//! ```text
//!   TriggerLoop          Worker 1 .. N
//!   - ChannelReady       - WorkerWaiting
//!   - ChannelDrained     - WorkerCompleted
//!   - Signaled           - WorkerStopped
//!   - ChannelRemoved
//!         │                    │
//!         └──────► EventBus ◄──┘
//!                     │
//!               ConsolePrinter
//! ```

mod bus;
mod console;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use console::ConsolePrinter;
pub use types::Event;
