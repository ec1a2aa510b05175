//! Resolution loop: pulls replies off the transport and settles entries.
//!
//! Runs as one tokio task per pipeline. It is the only place that moves
//! entries out of `Pending`, apart from shutdown.

use crate::domain::{CorrelationTable, PipelineError, PipelineId, PipelineStats};
use crate::ports::{Delivery, ReplyOrdering, Transport, TransportError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Consecutive receive errors after which the transport is treated as closed.
pub(crate) const MAX_RECEIVE_FAILURES: u32 = 8;
const RECEIVE_BACKOFF_INITIAL: Duration = Duration::from_millis(10);
const RECEIVE_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// State shared between the manager and its resolution loop.
pub(crate) struct Shared<R> {
    pub(crate) table: Mutex<CorrelationTable<R>>,
    pub(crate) stats: PipelineStats,
    /// Cleared under the table lock; submits check it under the same lock.
    pub(crate) accepting: AtomicBool,
}

impl<R> Shared<R> {
    pub(crate) fn new(pipeline: PipelineId, ordering: ReplyOrdering) -> Self {
        let table = match ordering {
            ReplyOrdering::Fifo => CorrelationTable::in_order(pipeline),
            ReplyOrdering::Tagged => CorrelationTable::new(pipeline),
        };
        Self {
            table: Mutex::new(table),
            stats: PipelineStats::default(),
            accepting: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }
}

pub(crate) struct ResolutionLoop<T: Transport> {
    pub(crate) pipeline: PipelineId,
    pub(crate) transport: Arc<T>,
    pub(crate) shared: Arc<Shared<T::Reply>>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl<T: Transport> ResolutionLoop<T> {
    /// Run until the transport closes or shutdown is signalled.
    pub(crate) async fn run(self) {
        let ResolutionLoop {
            pipeline,
            transport,
            shared,
            mut shutdown,
        } = self;
        let ordering = transport.ordering();

        debug!(pipeline = %pipeline.short(), ordering = %ordering, "Resolution loop started");

        let mut failures = 0u32;
        'receive: loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(pipeline = %pipeline.short(), "Resolution loop stopping on shutdown");
                        break;
                    }
                }

                received = transport.receive() => match received {
                    Ok(delivery) => {
                        failures = 0;
                        route(&shared, pipeline, ordering, delivery);
                    }
                    Err(TransportError::Closed) => {
                        on_transport_closed(&shared, pipeline, "transport closed with request in flight");
                        break;
                    }
                    Err(e) => {
                        failures += 1;
                        if failures >= MAX_RECEIVE_FAILURES {
                            error!(
                                pipeline = %pipeline.short(),
                                error = %e,
                                failures,
                                "Transport keeps failing, treating it as closed"
                            );
                            on_transport_closed(&shared, pipeline, "transport failed repeatedly with request in flight");
                            break;
                        }

                        let delay = receive_backoff(failures);
                        error!(
                            pipeline = %pipeline.short(),
                            error = %e,
                            failures,
                            retry_in_ms = delay.as_millis() as u64,
                            "Error receiving reply"
                        );
                        tokio::select! {
                            biased;
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    break 'receive;
                                }
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
            }
        }
    }
}

/// Delay before the next receive after `failures` consecutive errors.
fn receive_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    RECEIVE_BACKOFF_INITIAL
        .saturating_mul(1 << exponent)
        .min(RECEIVE_BACKOFF_MAX)
}

/// Settle the entry a delivery belongs to, or discard it as an orphan.
fn route<R>(shared: &Shared<R>, pipeline: PipelineId, ordering: ReplyOrdering, delivery: Delivery<R>) {
    let now = Instant::now();
    let sequence = delivery.sequence;

    let resolution = {
        let mut table = shared.table.lock();
        match ordering {
            ReplyOrdering::Fifo => table.resolve_next(delivery.outcome, now),
            ReplyOrdering::Tagged => table.resolve_tagged(sequence, delivery.outcome, now),
        }
    };

    let Some(resolution) = resolution else {
        PipelineStats::bump(&shared.stats.orphaned);
        warn!(
            pipeline = %pipeline.short(),
            sequence = %sequence,
            "Reply matches no live request, discarding"
        );
        return;
    };

    if ordering == ReplyOrdering::Fifo && resolution.expected != sequence {
        warn!(
            pipeline = %pipeline.short(),
            token = %resolution.token,
            expected = %resolution.expected,
            received = %sequence,
            "FIFO reply sequence does not match oldest pending request"
        );
    }

    if resolution.failed {
        PipelineStats::bump(&shared.stats.failed);
        debug!(
            token = %resolution.token,
            latency_us = resolution.latency.as_micros() as u64,
            "Request failed remotely"
        );
    } else {
        PipelineStats::bump(&shared.stats.resolved);
        debug!(
            token = %resolution.token,
            latency_us = resolution.latency.as_micros() as u64,
            "Request resolved"
        );
    }
}

/// No reply can arrive any more: stop admitting and fail what is pending.
fn on_transport_closed<R>(shared: &Shared<R>, pipeline: PipelineId, reason: &str) {
    let failed = {
        let mut table = shared.table.lock();
        shared.accepting.store(false, Ordering::Release);
        table.fail_pending(&PipelineError::TransportUnavailable(reason.into()))
    };

    PipelineStats::add(&shared.stats.failed, failed.len());
    if failed.is_empty() {
        debug!(pipeline = %pipeline.short(), "Transport closed");
    } else {
        warn!(
            pipeline = %pipeline.short(),
            failed = failed.len(),
            "Transport closed with requests in flight"
        );
    }
}
