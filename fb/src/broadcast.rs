//! Broadcast event primitive
//!
//! A reusable boolean signal with broadcast-wake and manual-reset semantics.
//! Every state change goes through one mutex and every wake-up through one
//! condition variable, so `signal()` can never slip between a waiter's check
//! and its park.
//!
//! On top of the plain flag the event carries a generation counter. Waiting on
//! the flag alone lets one consumer's `clear()` hide a broadcast from the
//! others; waiting on the generation gives every consumer its own cursor.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Returned by the blocking operations once the event has been closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("broadcast event closed")]
pub struct Closed;

#[derive(Debug, Default)]
struct SignalState {
    signaled: bool,
    generation: u64,
    closed: bool,
}

/// Shared broadcast signal
///
/// Constructed once and shared as `Arc<BroadcastEvent>` between the trigger
/// loop and all workers.
#[derive(Debug, Default)]
pub struct BroadcastEvent {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl BroadcastEvent {
    pub fn new() -> Self {
        Self::default()
    }

    // The state is plain data that is never left half-written, so a panic in
    // another holder does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the flag, advance the generation and wake every parked waiter
    ///
    /// Calling this while already set still advances the generation and
    /// re-notifies. Returns the new generation.
    pub fn signal(&self) -> u64 {
        let mut state = self.lock();
        state.signaled = true;
        state.generation += 1;
        let generation = state.generation;
        drop(state);

        self.cond.notify_all();
        debug!(generation, "BroadcastEvent::signal: notified all waiters");
        generation
    }

    /// Block until the flag is observed set
    ///
    /// Returns immediately when the flag is already set.
    pub fn wait(&self) -> Result<(), Closed> {
        let state = self.lock();
        let state = self
            .cond
            .wait_while(state, |s| !s.signaled && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);

        if !state.signaled {
            return Err(Closed);
        }
        Ok(())
    }

    /// Bounded variant of [`wait`](Self::wait)
    ///
    /// `Ok(false)` means the timeout elapsed with the flag still clear.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, Closed> {
        let state = self.lock();
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| !s.signaled && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);

        if state.closed && !state.signaled {
            return Err(Closed);
        }
        Ok(state.signaled)
    }

    /// Block until the generation has advanced past `last_seen`
    ///
    /// Returns the current generation, which may be more than one step ahead
    /// when several signals arrived while the caller was busy.
    pub fn wait_for_generation(&self, last_seen: u64) -> Result<u64, Closed> {
        let state = self.lock();
        let state = self
            .cond
            .wait_while(state, |s| s.generation <= last_seen && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);

        if state.generation <= last_seen {
            return Err(Closed);
        }
        Ok(state.generation)
    }

    /// Reset the flag
    ///
    /// Other waiters may or may not have observed the previous `true`.
    pub fn clear(&self) {
        self.lock().signaled = false;
    }

    /// Clear the flag and report whether it was set, as one atomic step
    pub fn take(&self) -> bool {
        let mut state = self.lock();
        std::mem::replace(&mut state.signaled, false)
    }

    /// Non-blocking read of the flag
    pub fn is_set(&self) -> bool {
        self.lock().signaled
    }

    /// Number of `signal()` calls so far
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Wake every waiter for good
    ///
    /// Blocking calls still report a broadcast that is pending at close time,
    /// and return [`Closed`] once nothing is left to observe.
    pub fn close(&self) {
        self.lock().closed = true;
        self.cond.notify_all();
        debug!("BroadcastEvent::close: closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
