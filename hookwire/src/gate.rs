//! Mutual exclusion for command round-trips.
//!
//! Nothing on the wire ties a status or output event to the command that
//! caused it, only adjacency. Holding the gate from send until both replies
//! are collected keeps a second command off the wire in the meantime.

use tokio::sync::{Mutex, MutexGuard};

/// A binary gate, initially open. Waiters are admitted in FIFO order.
#[derive(Debug, Default)]
pub struct Gate {
    /// The lock itself; the guarded value is unused.
    lock: Mutex<()>,
}

/// Proof of holding the [`Gate`]. Dropping it reopens the gate.
///
/// Release therefore happens on every exit path, including `?` returns
/// and cancellation of the owning future.
#[derive(Debug)]
#[must_use = "the gate reopens as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    /// Held for its `Drop`.
    _held: MutexGuard<'a, ()>,
}

impl Gate {
    /// Creates an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the gate is open, then closes it behind the caller.
    pub async fn acquire(&self) -> GateGuard<'_> {
        GateGuard {
            _held: self.lock.lock().await,
        }
    }

    /// Returns `true` if some caller currently holds the gate.
    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
