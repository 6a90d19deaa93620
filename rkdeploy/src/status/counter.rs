//! Shared tally of how many resources are still pending or have failed.

use std::sync::Mutex;

/// Value snapshot of the counter, safe to format without holding the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub total: usize,
    pub pending: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct Counter {
    counts: Mutex<Counts>,
}

impl Counter {
    pub fn new(total: usize) -> Self {
        Counter {
            counts: Mutex::new(Counts {
                total,
                pending: total,
                failed: 0,
            }),
        }
    }

    /// Records one resource reaching a terminal state. Must be called
    /// exactly once per resource; returns the snapshot after the update.
    pub fn mark_processed(&self, failed: bool) -> Counts {
        let mut counts = self.counts.lock().unwrap_or_else(|err| err.into_inner());
        counts.pending = counts.pending.saturating_sub(1);
        if failed {
            counts.failed += 1;
        }
        *counts
    }

    pub fn copy(&self) -> Counts {
        *self.counts.lock().unwrap_or_else(|err| err.into_inner())
    }
}
