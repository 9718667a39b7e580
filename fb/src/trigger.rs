//! External trigger ingestion loop
//!
//! Bridges one connection on a one-shot FIFO into one broadcast, forever:
//!
//! 1. provision a fresh channel
//! 2. wait for an external writer and drain it
//! 3. sleep the processing delay on this thread
//! 4. signal the broadcast event once
//! 5. destroy the channel, loop
//!
//! Because the delay runs before the next channel exists, at most one
//! trigger cycle is ever outstanding.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::broadcast::BroadcastEvent;
use crate::channel::{self, Channel, announce};
use crate::error::TriggerError;
use crate::events::EventEmitter;
use crate::shutdown::Shutdown;

/// Settings for the trigger loop
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Parent directory for the per-channel temp dirs
    pub channel_dir: PathBuf,
    /// Prefix of the per-channel temp dirs
    pub prefix: String,
    /// Fixed delay between draining a channel and signaling
    pub processing_delay: Duration,
    /// Where to publish the listening channel's path
    pub announce_file: Option<PathBuf>,
    /// Stop after this many triggers
    pub max_triggers: Option<u64>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            channel_dir: std::env::temp_dir(),
            prefix: channel::DEFAULT_PREFIX.to_string(),
            processing_delay: Duration::from_secs(3),
            announce_file: None,
            max_triggers: None,
        }
    }
}

/// What the loop did before it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerStats {
    pub triggers: u64,
}

/// The sole producer of broadcasts
pub struct TriggerLoop {
    config: TriggerConfig,
    event: Arc<BroadcastEvent>,
    shutdown: Shutdown,
    emitter: EventEmitter,
    seq: u64,
}

impl TriggerLoop {
    pub fn new(config: TriggerConfig, event: Arc<BroadcastEvent>, shutdown: Shutdown, emitter: EventEmitter) -> Self {
        debug!(?config, "TriggerLoop::new: called");
        Self {
            config,
            event,
            shutdown,
            emitter,
            seq: 0,
        }
    }

    /// Serve channels until cancelled, `max_triggers` is reached, or a channel fails
    ///
    /// Cancellation is a clean stop. Any other error is fatal and returned
    /// as-is; nothing is retried.
    pub fn run(mut self) -> Result<TriggerStats, TriggerError> {
        info!(
            dir = ?self.config.channel_dir,
            delay = ?self.config.processing_delay,
            "Trigger loop started"
        );
        let mut triggers = 0u64;

        loop {
            if self.config.max_triggers.is_some_and(|max| triggers >= max) {
                debug!(triggers, "TriggerLoop::run: trigger limit reached");
                break;
            }
            if self.shutdown.is_cancelled() {
                debug!("TriggerLoop::run: cancelled before provisioning");
                break;
            }

            match self.cycle() {
                Ok(()) => triggers += 1,
                Err(e) if e.is_cancelled() => {
                    info!("Trigger loop cancelled");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Trigger loop failed");
                    self.emitter.trigger_stopped(triggers);
                    return Err(e);
                }
            }
        }

        info!(triggers, "Trigger loop stopped");
        self.emitter.trigger_stopped(triggers);
        Ok(TriggerStats { triggers })
    }

    /// One provision / wait / delay / signal / destroy cycle
    fn cycle(&mut self) -> Result<(), TriggerError> {
        self.seq += 1;
        let seq = self.seq;
        let channel = Channel::provision(&self.config.channel_dir, &self.config.prefix, seq)?;
        let path = channel.path().to_path_buf();

        let result = self.serve(&channel);

        // Removal happens on every path, including cancellation
        if let Err(e) = channel.destroy() {
            warn!(?path, error = %e, "Failed to destroy channel");
        }
        self.emitter.channel_removed(seq, &path);
        debug!(seq, ?path, ok = result.is_ok(), "TriggerLoop::cycle: done");
        result
    }

    fn serve(&self, channel: &Channel) -> Result<(), TriggerError> {
        let seq = channel.seq();
        let mut listener = channel.listen()?;

        if let Some(announce_file) = &self.config.announce_file {
            announce::publish(announce_file, channel.path())?;
        }
        info!(seq, path = ?channel.path(), "Waiting for a writer");
        self.emitter.channel_ready(seq, channel.path());

        let drained = listener.drain(&self.shutdown);
        drop(listener);

        if let Some(announce_file) = &self.config.announce_file
            && let Err(e) = announce::retract(announce_file, channel.path())
        {
            warn!(error = %e, "Failed to retract announced channel");
        }

        let bytes = drained?;
        info!(seq, bytes, "Trigger received");
        self.emitter.channel_drained(seq, bytes);

        debug!(delay = ?self.config.processing_delay, "TriggerLoop::serve: processing delay");
        self.shutdown.sleep(self.config.processing_delay)?;

        let generation = self.event.signal();
        info!(seq, generation, "Broadcast signaled");
        self.emitter.signaled(seq, generation);
        Ok(())
    }
}
