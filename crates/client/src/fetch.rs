//! Most-recently-issued-wins guard for overlapping fetches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Issues generation-tagged tickets; only the newest ticket is current.
///
/// Cloning shares the counter. [`invalidate`](Self::invalidate) retires every
/// outstanding ticket for good (used on unmount).
#[derive(Debug, Clone, Default)]
pub struct FetchGuard {
    inner: Arc<GuardInner>,
}

#[derive(Debug, Default)]
struct GuardInner {
    generation: AtomicU64,
    retired: AtomicBool,
}

/// Proof that a fetch was issued at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl FetchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fetch; every earlier ticket becomes stale.
    pub fn begin(&self) -> FetchTicket {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        FetchTicket { generation }
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        !self.inner.retired.load(Ordering::SeqCst) && self.inner.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Retire all tickets, including ones issued later.
    pub fn invalidate(&self) {
        self.inner.retired.store(true, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Accept tickets again after [`invalidate`](Self::invalidate) (remount).
    pub fn revive(&self) {
        self.inner.retired.store(false, Ordering::SeqCst);
    }

    pub fn is_retired(&self) -> bool {
        self.inner.retired.load(Ordering::SeqCst)
    }
}
