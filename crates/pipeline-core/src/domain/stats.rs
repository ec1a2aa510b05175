//! Counters for pipeline activity.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for one pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Requests accepted by `submit`
    pub submitted: AtomicU64,
    /// Submits refused (backpressure, closed transport)
    pub rejected: AtomicU64,
    /// Entries resolved with a reply
    pub resolved: AtomicU64,
    /// Entries resolved with an error
    pub failed: AtomicU64,
    /// Entries removed by a successful or failed collect
    pub collected: AtomicU64,
    /// Collect deadlines that elapsed
    pub timeouts: AtomicU64,
    /// Entries cancelled by shutdown
    pub cancelled: AtomicU64,
    /// Replies that matched no live entry
    pub orphaned: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            collected: self.collected.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`PipelineStats`] for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub resolved: u64,
    pub failed: u64,
    pub collected: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub orphaned: u64,
}

impl StatsSnapshot {
    /// Requests submitted but not yet resolved, failed or cancelled.
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.resolved + self.failed)
            .saturating_sub(self.cancelled)
    }
}
