//! Trigger channel and runtime error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::shutdown::Cancelled;

/// Errors raised while provisioning, serving or writing a trigger channel
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Failed to provision channel at {path}: {source}")]
    Provision { path: PathBuf, source: io::Error },

    #[error("Failed to open channel {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Failed to drain channel {path}: {source}")]
    Drain { path: PathBuf, source: io::Error },

    #[error("Failed to write channel {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("No reader is listening on channel {0}")]
    NotListening(PathBuf),

    #[error("Failed to update announce file {path}: {source}")]
    Announce { path: PathBuf, source: io::Error },

    #[error("Cancelled")]
    Cancelled,
}

impl From<Cancelled> for TriggerError {
    fn from(_: Cancelled) -> Self {
        TriggerError::Cancelled
    }
}

impl TriggerError {
    /// Whether this is the cancellation control-flow signal rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TriggerError::Cancelled)
    }
}

/// Errors raised while starting or joining the coordinator threads
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to create shutdown token: {0}")]
    Shutdown(#[source] io::Error),

    #[error("Failed to spawn thread {name}: {source}")]
    Spawn { name: String, source: io::Error },

    #[error("Thread {0} panicked")]
    Panicked(String),

    #[error(transparent)]
    Trigger(#[from] TriggerError),
}
