//! Overlap protection for recurring cycles
//!
//! A tick that fires while the previous run of the same cycle is still in
//! flight is skipped, not queued. Skips are counted so they are observable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::warn;

/// Single-flight guard for one recurring cycle
#[derive(Debug)]
pub struct OverlapGuard {
    name: &'static str,
    busy: AtomicBool,
    skipped: AtomicU64,
}

impl OverlapGuard {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            busy: AtomicBool::new(false),
            skipped: AtomicU64::new(0),
        }
    }

    /// Claim the cycle. Returns `None` (and counts a skip) if a run is
    /// already in flight.
    pub fn try_enter(&self) -> Option<CycleGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(CycleGuard { owner: self })
        } else {
            let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Skipping {} tick: previous run still in flight ({} skipped so far)",
                self.name, skipped
            );
            None
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Number of ticks skipped because of overlap
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Held for the duration of one run; releases the cycle on drop
#[derive(Debug)]
pub struct CycleGuard<'a> {
    owner: &'a OverlapGuard,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.owner.busy.store(false, Ordering::Release);
    }
}
