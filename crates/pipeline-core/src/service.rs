//! Pipeline manager: the caller-facing service over one transport.
//!
//! ```text
//! caller ──submit──→ PipelineManager ──send──→ Transport
//!    ↑                     │ insert Pending          │
//!    │                     ▼                         │ receive
//!    └──collect/drain── CorrelationTable ←──settle── ResolutionLoop
//! ```
//!
//! `submit` holds the table lock across the transport's non-blocking send,
//! so token order always equals issuance order and a reply can never be
//! routed before its entry exists.

use crate::domain::{
    ConfigError, CorrelationTable, PipelineConfig, PipelineError, PipelineId, PipelineResult, PipelineStats,
    RequestKind, StatsSnapshot, Take, Token,
};
use crate::ports::{PipelineApi, ShutdownPolicy, ShutdownReport, Transport};
use crate::resolver::{ResolutionLoop, Shared};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Owns one transport, its correlation table and its resolution loop.
pub struct PipelineManager<T: Transport> {
    id: PipelineId,
    config: PipelineConfig,
    transport: Arc<T>,
    shared: Arc<Shared<T::Reply>>,
    resolver: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shut_down: AtomicBool,
}

impl<T: Transport> PipelineManager<T> {
    /// Create a manager over `transport` and start its resolution loop.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(transport: Arc<T>, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let id = PipelineId::new();
        let shared = Arc::new(Shared::new(id, transport.ordering()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let resolution = ResolutionLoop {
            pipeline: id,
            transport: transport.clone(),
            shared: shared.clone(),
            shutdown: shutdown_rx,
        };
        let resolver = tokio::spawn(resolution.run());

        info!(
            pipeline = %id,
            ordering = %transport.ordering(),
            max_outstanding = ?config.max_outstanding,
            "Pipeline started"
        );

        Ok(Self {
            id,
            config,
            transport,
            shared,
            resolver: Mutex::new(Some(resolver)),
            shutdown_tx,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Manager with the default configuration.
    pub fn with_defaults(transport: Arc<T>) -> Result<Self, ConfigError> {
        Self::new(transport, PipelineConfig::default())
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Live entries: pending plus resolved-but-uncollected.
    pub fn pending_count(&self) -> usize {
        self.shared.table.lock().len()
    }

    /// Entries still waiting for their reply.
    pub fn in_flight(&self) -> usize {
        self.shared.table.lock().in_flight()
    }

    /// Whether `token` is live and still waiting for its reply.
    pub fn is_pending(&self, token: &Token) -> bool {
        self.shared.table.lock().is_pending(token)
    }

    /// Whether `token` is live (pending or resolved, not yet collected).
    pub fn is_live(&self, token: &Token) -> bool {
        self.shared.table.lock().contains(token)
    }

    /// Whether submits are still admitted.
    pub fn is_accepting(&self) -> bool {
        self.shared.is_accepting()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.shared.stats
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    fn reject(&self, err: PipelineError) -> PipelineError {
        PipelineStats::bump(&self.shared.stats.rejected);
        debug!(pipeline = %self.id.short(), error = %err, "Submit rejected");
        err
    }

    /// Send one request and record its entry. Caller holds the table lock.
    fn submit_locked(
        &self,
        table: &mut CorrelationTable<T::Reply>,
        request: T::Request,
    ) -> PipelineResult<Token> {
        let kind = request.kind();
        let wire_sequence = self.transport.send(request)?;

        table
            .insert(kind, wire_sequence, Instant::now())
            .inspect_err(|err| {
                error!(
                    pipeline = %self.id.short(),
                    sequence = %wire_sequence,
                    error = %err,
                    "Transport issued a sequence that is still live"
                );
            })
    }

    /// Wait until `token` settles, then consume it.
    async fn wait(&self, token: Token) -> PipelineResult<T::Reply> {
        loop {
            let taken = self.shared.table.lock().take(&token);
            let mut settled = match taken {
                Take::Ready(result) => {
                    PipelineStats::bump(&self.shared.stats.collected);
                    debug!(token = %token, ok = result.is_ok(), "Collected");
                    return result;
                }
                Take::Cancelled => return Err(PipelineError::Cancelled(token)),
                Take::Unknown => return Err(PipelineError::UnknownToken(token)),
                Take::Pending(settled) => settled,
            };

            // A closed channel means the entry was removed; the next take
            // reports why.
            let _ = settled.wait_for(|done| *done).await;
        }
    }

    /// Collect everything live, optionally bounded by a deadline.
    ///
    /// Entries not collected before the deadline stay in the table.
    async fn collect_live(
        &self,
        deadline: Option<Instant>,
    ) -> Vec<(Token, PipelineResult<T::Reply>)> {
        let tokens = self.shared.table.lock().live_tokens();
        let mut results = Vec::with_capacity(tokens.len());

        for token in tokens {
            let result = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, self.wait(token)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            pipeline = %self.id.short(),
                            token = %token,
                            "Flush deadline reached with requests outstanding"
                        );
                        break;
                    }
                },
                None => self.wait(token).await,
            };

            // Someone else collected it concurrently
            if matches!(result, Err(PipelineError::UnknownToken(_))) {
                continue;
            }
            results.push((token, result));
        }

        results
    }

    /// Stop admitting submits. Returns false if already stopped by shutdown.
    fn stop_accepting(&self) -> bool {
        let _table = self.shared.table.lock();
        self.shared.accepting.store(false, Ordering::Release);
        !self.shut_down.swap(true, Ordering::AcqRel)
    }

    fn cancel_live(&self) -> Vec<Token> {
        let cancelled = self.shared.table.lock().cancel_all();
        PipelineStats::add(&self.shared.stats.cancelled, cancelled.len());
        if !cancelled.is_empty() {
            warn!(
                pipeline = %self.id.short(),
                cancelled = cancelled.len(),
                "Cancelled live requests"
            );
        }
        cancelled
    }

    async fn stop_resolver(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.resolver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl<T: Transport> PipelineApi for PipelineManager<T> {
    type Request = T::Request;
    type Reply = T::Reply;

    fn submit(&self, request: T::Request) -> PipelineResult<Token> {
        let mut table = self.shared.table.lock();

        if !self.shared.is_accepting() {
            return Err(self.reject(PipelineError::TransportUnavailable(
                "pipeline is not accepting requests".into(),
            )));
        }
        if let Some(limit) = self.config.max_outstanding {
            if table.len() >= limit {
                return Err(self.reject(PipelineError::TooManyOutstanding { limit }));
            }
        }

        let token = match self.submit_locked(&mut table, request) {
            Ok(token) => token,
            Err(err) => return Err(self.reject(err)),
        };
        let live = table.len();
        drop(table);

        PipelineStats::bump(&self.shared.stats.submitted);
        debug!(token = %token, live = live, "Submitted");
        Ok(token)
    }

    fn submit_batch(&self, requests: Vec<T::Request>) -> PipelineResult<Vec<Token>> {
        let mut table = self.shared.table.lock();

        if !self.shared.is_accepting() {
            return Err(self.reject(PipelineError::TransportUnavailable(
                "pipeline is not accepting requests".into(),
            )));
        }
        if let Some(limit) = self.config.max_outstanding {
            if table.len() + requests.len() > limit {
                return Err(self.reject(PipelineError::TooManyOutstanding { limit }));
            }
        }

        let total = requests.len();
        let mut tokens = Vec::with_capacity(total);
        for request in requests {
            match self.submit_locked(&mut table, request) {
                Ok(token) => tokens.push(token),
                Err(err) => {
                    drop(table);
                    PipelineStats::add(&self.shared.stats.submitted, tokens.len());
                    warn!(
                        pipeline = %self.id.short(),
                        issued = tokens.len(),
                        total = total,
                        error = %err,
                        "Batch interrupted; issued requests remain live"
                    );
                    return Err(self.reject(err));
                }
            }
        }
        drop(table);

        PipelineStats::add(&self.shared.stats.submitted, tokens.len());
        debug!(pipeline = %self.id.short(), count = tokens.len(), "Submitted batch");
        Ok(tokens)
    }

    async fn collect(&self, token: Token) -> PipelineResult<T::Reply> {
        match self.config.default_collect_timeout {
            Some(deadline) => self.collect_within(token, deadline).await,
            None => self.wait(token).await,
        }
    }

    async fn collect_within(&self, token: Token, deadline: Duration) -> PipelineResult<T::Reply> {
        match tokio::time::timeout(deadline, self.wait(token)).await {
            Ok(result) => result,
            Err(_) => {
                PipelineStats::bump(&self.shared.stats.timeouts);
                warn!(
                    token = %token,
                    waited_ms = deadline.as_millis() as u64,
                    "Collect timed out; request stays pending"
                );
                Err(PipelineError::Timeout {
                    token,
                    waited: deadline,
                })
            }
        }
    }

    async fn collect_all(&self, tokens: Vec<Token>) -> Vec<PipelineResult<T::Reply>> {
        let mut results = Vec::with_capacity(tokens.len());
        for token in tokens {
            results.push(self.collect(token).await);
        }
        results
    }

    async fn drain(&self) -> Vec<(Token, PipelineResult<T::Reply>)> {
        let results = self.collect_live(None).await;
        debug!(pipeline = %self.id.short(), drained = results.len(), "Drained");
        results
    }

    async fn shutdown(&self, policy: ShutdownPolicy) -> ShutdownReport<T::Reply> {
        if !self.stop_accepting() {
            debug!(pipeline = %self.id.short(), "Shutdown already performed");
            return ShutdownReport::empty(policy);
        }

        info!(pipeline = %self.id.short(), policy = ?policy, live = self.pending_count(), "Shutting down pipeline");

        let flushed = match policy {
            ShutdownPolicy::Flush => {
                let deadline = self.config.flush_timeout.map(|t| Instant::now() + t);
                self.collect_live(deadline).await
            }
            ShutdownPolicy::Cancel => Vec::new(),
        };

        // Cancel before closing, so waiters see Cancelled rather than a
        // transport failure.
        let cancelled = self.cancel_live();
        self.transport.close();
        self.stop_resolver().await;

        info!(
            pipeline = %self.id.short(),
            flushed = flushed.len(),
            cancelled = cancelled.len(),
            "Pipeline shut down"
        );

        ShutdownReport {
            policy,
            flushed,
            cancelled,
        }
    }
}

impl<T: Transport> Drop for PipelineManager<T> {
    fn drop(&mut self) {
        if self.stop_accepting() {
            self.cancel_live();
            self.transport.close();
        }
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.resolver.lock().take() {
            handle.abort();
        }
    }
}
