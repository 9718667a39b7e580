//! Thread wiring for one coordinator run
//!
//! Owns the shared [`BroadcastEvent`] and [`Shutdown`] token, spawns the
//! worker threads and the trigger thread, and joins them in order. All
//! workers exist (and have captured the current generation) before the
//! trigger thread can signal anything.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::broadcast::BroadcastEvent;
use crate::config::Config;
use crate::error::{RuntimeError, TriggerError};
use crate::events::EventBus;
use crate::shutdown::Shutdown;
use crate::trigger::{TriggerConfig, TriggerLoop, TriggerStats};
use crate::worker::{FanoutPolicy, Worker, WorkerStats};

/// Everything needed to start a run
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub workers: usize,
    pub fanout: FanoutPolicy,
    pub trigger: TriggerConfig,
}

impl RuntimeConfig {
    pub fn from_config(config: &Config, max_triggers: Option<u64>) -> Self {
        Self {
            workers: config.workers,
            fanout: config.fanout,
            trigger: config.trigger_config(max_triggers),
        }
    }
}

/// Outcome of a run that ended without a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub triggers: u64,
    pub workers: Vec<WorkerStats>,
}

impl RunSummary {
    /// Total units of work across all workers
    pub fn completed(&self) -> u64 {
        self.workers.iter().map(|w| w.completed).sum()
    }
}

/// Cloneable handle that stops a running [`Runtime`] from any thread
#[derive(Clone)]
pub struct Stopper {
    shutdown: Shutdown,
    event: Arc<BroadcastEvent>,
}

impl Stopper {
    /// Cancel the trigger loop and release parked workers
    pub fn stop(&self) {
        debug!("Stopper::stop: called");
        self.shutdown.cancel();
        self.event.close();
    }
}

/// A started coordinator: N worker threads plus one trigger thread
pub struct Runtime {
    event: Arc<BroadcastEvent>,
    shutdown: Shutdown,
    trigger: (String, JoinHandle<Result<TriggerStats, TriggerError>>),
    workers: Vec<(String, JoinHandle<WorkerStats>)>,
}

impl Runtime {
    /// Spawn the workers, then the trigger loop
    pub fn start(config: RuntimeConfig, bus: &EventBus) -> Result<Self, RuntimeError> {
        info!(workers = config.workers, fanout = %config.fanout, "Starting runtime");
        let event = Arc::new(BroadcastEvent::new());
        let shutdown = Shutdown::new().map_err(RuntimeError::Shutdown)?;
        let stopper = Stopper {
            shutdown: shutdown.clone(),
            event: event.clone(),
        };

        let mut workers = Vec::with_capacity(config.workers);
        for id in 1..=config.workers {
            let name = format!("fb-worker-{}", id);
            let worker = Worker::new(id, event.clone(), config.fanout, bus.emitter_for(name.clone()));
            match thread::Builder::new().name(name.clone()).spawn(move || worker.run()) {
                Ok(handle) => workers.push((name, handle)),
                Err(source) => {
                    error!(%name, error = %source, "Failed to spawn worker");
                    stopper.stop();
                    abandon_workers(workers);
                    return Err(RuntimeError::Spawn { name, source });
                }
            }
        }
        debug!(count = workers.len(), "Runtime::start: workers spawned");

        let name = "fb-trigger".to_string();
        let trigger_loop = TriggerLoop::new(config.trigger, event.clone(), shutdown.clone(), bus.emitter_for(&name));
        let trigger = match thread::Builder::new().name(name.clone()).spawn(move || trigger_loop.run()) {
            Ok(handle) => (name, handle),
            Err(source) => {
                error!(%name, error = %source, "Failed to spawn trigger loop");
                stopper.stop();
                abandon_workers(workers);
                return Err(RuntimeError::Spawn { name, source });
            }
        };

        Ok(Self {
            event,
            shutdown,
            trigger,
            workers,
        })
    }

    pub fn stopper(&self) -> Stopper {
        Stopper {
            shutdown: self.shutdown.clone(),
            event: self.event.clone(),
        }
    }

    pub fn event(&self) -> &Arc<BroadcastEvent> {
        &self.event
    }

    /// Wait for the trigger loop to finish, then stop and join the workers
    ///
    /// Returns the trigger loop's fatal error, if it had one, after every
    /// thread has been joined.
    pub fn join(self) -> Result<RunSummary, RuntimeError> {
        let (name, handle) = self.trigger;
        let trigger = handle.join().map_err(|_| RuntimeError::Panicked(name));
        debug!(ok = trigger.as_ref().is_ok_and(|r| r.is_ok()), "Runtime::join: trigger loop joined");

        // Workers finish any broadcast still pending, then see the close
        self.shutdown.cancel();
        self.event.close();
        let workers = join_workers(self.workers);

        let stats = trigger??;
        let workers = workers?;
        let summary = RunSummary {
            triggers: stats.triggers,
            workers,
        };
        info!(
            triggers = summary.triggers,
            completed = summary.completed(),
            "Runtime stopped"
        );
        Ok(summary)
    }
}

/// Join workers started before a failed spawn; the spawn error wins
fn abandon_workers(workers: Vec<(String, JoinHandle<WorkerStats>)>) {
    if let Err(e) = join_workers(workers) {
        error!(error = %e, "Worker failed while aborting start");
    }
}

fn join_workers(workers: Vec<(String, JoinHandle<WorkerStats>)>) -> Result<Vec<WorkerStats>, RuntimeError> {
    let mut stats = Vec::with_capacity(workers.len());
    let mut panicked = None;
    for (name, handle) in workers {
        match handle.join() {
            Ok(s) => stats.push(s),
            Err(_) => {
                error!(%name, "Worker panicked");
                panicked.get_or_insert(name);
            }
        }
    }
    match panicked {
        Some(name) => Err(RuntimeError::Panicked(name)),
        None => Ok(stats),
    }
}
