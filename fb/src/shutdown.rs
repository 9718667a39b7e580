//! Cooperative cancellation
//!
//! A [`Shutdown`] token is observable at every blocking point of the system:
//! - sleeps park on a condition variable that `cancel()` notifies
//! - channel waits include the token's wake pipe in their `poll(2)` set
//!
//! The wake pipe is written once and never read, so it stays readable after
//! cancellation and every later `poll` sees it immediately.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Returned by blocking calls that were interrupted by cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancellation requested")]
pub struct Cancelled;

#[derive(Debug)]
struct Inner {
    cancelled: Mutex<bool>,
    cond: Condvar,
    wake_rx: File,
    wake_tx: File,
}

/// Cloneable cancellation token
#[derive(Debug, Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> io::Result<Self> {
        let (rx, tx) = nix::unistd::pipe().map_err(io::Error::from)?;
        debug!("Shutdown::new: wake pipe created");
        Ok(Self {
            inner: Arc::new(Inner {
                cancelled: Mutex::new(false),
                cond: Condvar::new(),
                wake_rx: File::from(rx),
                wake_tx: File::from(tx),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request cancellation; calling it again is a no-op
    pub fn cancel(&self) {
        let mut cancelled = self.lock();
        if *cancelled {
            return;
        }
        *cancelled = true;
        drop(cancelled);

        self.inner.cond.notify_all();
        if let Err(e) = (&self.inner.wake_tx).write_all(&[1]) {
            warn!(error = %e, "Failed to write shutdown wake pipe");
        }
        debug!("Shutdown::cancel: cancellation requested");
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Sleep for `duration` unless cancelled first
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let cancelled = self.lock();
        let (cancelled, _) = self
            .inner
            .cond
            .wait_timeout_while(cancelled, duration, |c| !*c)
            .unwrap_or_else(PoisonError::into_inner);

        if *cancelled { Err(Cancelled) } else { Ok(()) }
    }

    /// Descriptor that becomes readable once cancelled, for `poll(2)` sets
    pub fn wake_fd(&self) -> BorrowedFd<'_> {
        self.inner.wake_rx.as_fd()
    }
}
