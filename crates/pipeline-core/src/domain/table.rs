//! Correlation table: live mapping from [`Token`] to its resolution state.
//!
//! The table itself is not synchronized. The pipeline manager owns it behind
//! a short-held mutex and never awaits while holding the lock; waiting is
//! done on the per-entry `watch` channel handed out by [`CorrelationTable::take`].
//!
//! ## Entry lifecycle
//!
//! ```text
//! submit ──insert──→ [Pending] ──reply──→ [Resolved] ──collect──→ (removed)
//!                        │
//!                        ├──remote error / transport closed──→ [Failed] ──collect──→ (removed)
//!                        └──shutdown(Cancel)──→ tombstone ──collect──→ Cancelled
//! ```

use super::error::{PipelineError, RemoteError};
use super::token::{PipelineId, SequenceId, Token};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Resolution state of one entry.
#[derive(Debug)]
pub enum EntryState<R> {
    /// Request sent, no reply yet.
    Pending,
    /// Reply delivered, waiting for collection.
    Resolved(R),
    /// Request failed; the error is handed to the collector.
    Failed(PipelineError),
}

impl<R> EntryState<R> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// One outstanding request, born at submit and removed at collect.
#[derive(Debug)]
pub struct PendingEntry<R> {
    token: Token,
    wire_sequence: SequenceId,
    submitted_at: Instant,
    state: EntryState<R>,
    /// Flips to `true` once the entry leaves `Pending`.
    signal: watch::Sender<bool>,
}

impl<R> PendingEntry<R> {
    fn new(token: Token, wire_sequence: SequenceId, submitted_at: Instant) -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            token,
            wire_sequence,
            submitted_at,
            state: EntryState::Pending,
            signal,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn wire_sequence(&self) -> SequenceId {
        self.wire_sequence
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn state(&self) -> &EntryState<R> {
        &self.state
    }

    fn settle(&mut self, state: EntryState<R>) {
        self.state = state;
        self.signal.send_replace(true);
    }
}

/// Result of attempting to take an entry out of the table.
#[derive(Debug)]
pub enum Take<R> {
    /// Entry was resolved or failed and has been removed.
    Ready(Result<R, PipelineError>),
    /// Entry is still pending; wait on the receiver, then try again.
    Pending(watch::Receiver<bool>),
    /// Entry was cancelled by shutdown; the tombstone has been consumed.
    Cancelled,
    /// Never issued here, or already collected.
    Unknown,
}

/// Outcome of routing one reply into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub token: Token,
    /// Wire sequence recorded at submit time.
    pub expected: SequenceId,
    /// Time between submit and resolution.
    pub latency: Duration,
    /// Whether the reply carried a remote error.
    pub failed: bool,
}

/// Mapping from Token to PendingEntry, owned by one pipeline.
///
/// Invariants:
/// - every issued token is present until collected or cancelled
/// - `in_flight` holds exactly the ordinals of `Pending` entries
/// - when routing by wire id, `by_wire` maps the wire sequence of every
///   `Pending` entry; in issuance-order routing it stays empty
/// - ordinals are never reused
#[derive(Debug)]
pub struct CorrelationTable<R> {
    pipeline: PipelineId,
    routes_by_wire: bool,
    entries: BTreeMap<u64, PendingEntry<R>>,
    in_flight: BTreeSet<u64>,
    by_wire: HashMap<SequenceId, u64>,
    tombstones: HashSet<u64>,
    next_sequence: u64,
}

impl<R> CorrelationTable<R> {
    /// Table whose replies are routed by the wire sequence they carry.
    pub fn new(pipeline: PipelineId) -> Self {
        Self::with_routing(pipeline, true)
    }

    /// Table whose replies resolve entries strictly in issuance order.
    ///
    /// Wire sequences are recorded for diagnostics only, so a transport may
    /// repeat or wrap them while earlier requests are still pending.
    pub fn in_order(pipeline: PipelineId) -> Self {
        Self::with_routing(pipeline, false)
    }

    fn with_routing(pipeline: PipelineId, routes_by_wire: bool) -> Self {
        Self {
            pipeline,
            routes_by_wire,
            entries: BTreeMap::new(),
            in_flight: BTreeSet::new(),
            by_wire: HashMap::new(),
            tombstones: HashSet::new(),
            next_sequence: 1,
        }
    }

    pub fn pipeline(&self) -> PipelineId {
        self.pipeline
    }

    /// Whether replies are matched by wire sequence rather than by order.
    pub fn routes_by_wire(&self) -> bool {
        self.routes_by_wire
    }

    /// Cancelled tokens whose `Cancelled` outcome has not been collected yet.
    pub fn tombstones(&self) -> usize {
        self.tombstones.len()
    }

    /// Number of live entries (pending and resolved-but-uncollected).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries still waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether `token` names a live entry of this table.
    pub fn contains(&self, token: &Token) -> bool {
        self.entry(token).is_some()
    }

    /// Whether `token` names a live entry still waiting for its reply.
    pub fn is_pending(&self, token: &Token) -> bool {
        self.entry(token)
            .map(|entry| entry.state.is_pending())
            .unwrap_or(false)
    }

    /// Live tokens in increasing issuance order.
    pub fn live_tokens(&self) -> Vec<Token> {
        self.entries.values().map(|entry| entry.token).collect()
    }

    /// Insert a fresh `Pending` entry for a request the transport has
    /// already sent under `wire_sequence`.
    ///
    /// When routing by wire id, no token is allocated if the wire sequence
    /// still names a live pending entry.
    pub fn insert(
        &mut self,
        kind: &'static str,
        wire_sequence: SequenceId,
        now: Instant,
    ) -> Result<Token, PipelineError> {
        if self.routes_by_wire && self.by_wire.contains_key(&wire_sequence) {
            return Err(PipelineError::SequenceReused(wire_sequence));
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let token = Token::new(self.pipeline, sequence, kind);
        self.entries
            .insert(sequence, PendingEntry::new(token, wire_sequence, now));
        self.in_flight.insert(sequence);
        if self.routes_by_wire {
            self.by_wire.insert(wire_sequence, sequence);
        }

        Ok(token)
    }

    /// Resolve the oldest pending entry (FIFO transports).
    ///
    /// Returns `None` when nothing is in flight: the reply is an orphan.
    pub fn resolve_next(
        &mut self,
        outcome: Result<R, RemoteError>,
        now: Instant,
    ) -> Option<Resolution> {
        let sequence = self.in_flight.pop_first()?;
        self.settle(sequence, outcome, now)
    }

    /// Resolve the pending entry sent under `wire_sequence` (tagged transports).
    ///
    /// Returns `None` when no pending entry carries that sequence.
    pub fn resolve_tagged(
        &mut self,
        wire_sequence: SequenceId,
        outcome: Result<R, RemoteError>,
        now: Instant,
    ) -> Option<Resolution> {
        let sequence = *self.by_wire.get(&wire_sequence)?;
        self.in_flight.remove(&sequence);
        self.settle(sequence, outcome, now)
    }

    fn settle(
        &mut self,
        sequence: u64,
        outcome: Result<R, RemoteError>,
        now: Instant,
    ) -> Option<Resolution> {
        let entry = self.entries.get_mut(&sequence)?;
        if self.routes_by_wire {
            self.by_wire.remove(&entry.wire_sequence);
        }

        let token = entry.token;
        let failed = outcome.is_err();
        let state = match outcome {
            Ok(reply) => EntryState::Resolved(reply),
            Err(error) => EntryState::Failed(PipelineError::TransportReportedError { token, error }),
        };
        entry.settle(state);

        Some(Resolution {
            token,
            expected: entry.wire_sequence,
            latency: now.saturating_duration_since(entry.submitted_at),
            failed,
        })
    }

    /// Fail every pending entry with `error`. Resolved entries are kept.
    ///
    /// Returns the tokens that were failed.
    pub fn fail_pending(&mut self, error: &PipelineError) -> Vec<Token> {
        let pending: Vec<u64> = std::mem::take(&mut self.in_flight).into_iter().collect();
        self.by_wire.clear();

        pending
            .into_iter()
            .filter_map(|sequence| {
                let entry = self.entries.get_mut(&sequence)?;
                entry.settle(EntryState::Failed(error.clone()));
                Some(entry.token)
            })
            .collect()
    }

    /// Take the entry for `token` if it has settled.
    ///
    /// A settled entry is removed: each token is consumed at most once.
    pub fn take(&mut self, token: &Token) -> Take<R> {
        if token.pipeline() != self.pipeline {
            return Take::Unknown;
        }

        let sequence = token.sequence();
        match self.entries.get(&sequence) {
            Some(entry) if entry.token != *token => Take::Unknown,
            Some(entry) if entry.state.is_pending() => Take::Pending(entry.signal.subscribe()),
            Some(_) => match self.entries.remove(&sequence).map(|entry| entry.state) {
                Some(EntryState::Resolved(reply)) => Take::Ready(Ok(reply)),
                Some(EntryState::Failed(error)) => Take::Ready(Err(error)),
                _ => Take::Unknown,
            },
            None => {
                if self.tombstones.remove(&sequence) {
                    Take::Cancelled
                } else {
                    Take::Unknown
                }
            }
        }
    }

    /// Remove every live entry, leaving a one-shot tombstone per token.
    ///
    /// Dropping the entries closes their `watch` channels, which wakes any
    /// collector waiting on them. Returns the cancelled tokens.
    ///
    /// Tombstones outlive shutdown so a later collect still reports
    /// `Cancelled`. They are freed one by one as collected, or with the table.
    /// The manager admits nothing after cancelling, so they never outnumber
    /// the entries that were live at that moment.
    pub fn cancel_all(&mut self) -> Vec<Token> {
        self.in_flight.clear();
        self.by_wire.clear();

        let entries = std::mem::take(&mut self.entries);
        let tokens: Vec<Token> = entries.values().map(|entry| entry.token).collect();
        self.tombstones
            .extend(tokens.iter().map(|token| token.sequence()));
        tokens
    }

    fn entry(&self, token: &Token) -> Option<&PendingEntry<R>> {
        if token.pipeline() != self.pipeline {
            return None;
        }
        self.entries
            .get(&token.sequence())
            .filter(|entry| entry.token == *token)
    }
}
