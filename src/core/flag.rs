//! # Process-wide observable leader flag.
//!
//! One-writer/many-reader atomic boolean. The sole writer is the leader
//! core; peripheral subsystems (the ticker jobs, API handlers) receive a
//! read-only [`LeaderView`] and gate their work on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Writable leader flag owned by the leader core.
///
/// Set true on activation, false on defeat and shutdown.
pub(crate) struct LeaderFlag {
    inner: Arc<AtomicBool>,
}

impl LeaderFlag {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn store(&self, leader: bool) {
        self.inner.store(leader, Ordering::SeqCst);
    }

    /// Hands out a read-only view for peripheral consumers.
    pub(crate) fn view(&self) -> LeaderView {
        LeaderView {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only view of the leader flag.
///
/// Cheap to clone; reflects the writer's state immediately.
#[derive(Clone)]
pub struct LeaderView {
    inner: Arc<AtomicBool>,
}

impl LeaderView {
    /// True while this replica is the active leader.
    pub fn is_leader(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}
