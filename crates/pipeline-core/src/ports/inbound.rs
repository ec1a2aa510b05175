//! Inbound (Driving) port: the API exposed to callers.
//!
//! `submit` is cheap and never waits on the network. `collect`, `drain` and
//! `shutdown` are the only operations that wait.

use crate::domain::{PipelineResult, RequestKind, Token};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with live entries when the pipeline is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Wait for every live entry to resolve and hand the results back.
    Flush,
    /// Fail every live entry with `Cancelled` immediately.
    Cancel,
}

/// What shutdown did with the entries that were live when it started.
#[derive(Debug)]
pub struct ShutdownReport<R> {
    pub policy: ShutdownPolicy,
    /// Entries collected by a flush, in token order.
    pub flushed: Vec<(Token, PipelineResult<R>)>,
    /// Entries removed as cancelled, in token order.
    pub cancelled: Vec<Token>,
}

impl<R> ShutdownReport<R> {
    pub(crate) fn empty(policy: ShutdownPolicy) -> Self {
        Self {
            policy,
            flushed: Vec::new(),
            cancelled: Vec::new(),
        }
    }

    /// Whether shutdown found nothing live.
    pub fn is_clean(&self) -> bool {
        self.flushed.is_empty() && self.cancelled.is_empty()
    }
}

/// Primary API of a request pipeline.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Request payload
    type Request: RequestKind + Send + 'static;
    /// Reply payload
    type Reply: Send + 'static;

    /// Send `request` and return its token without waiting for the reply.
    ///
    /// # Errors
    /// - `TransportUnavailable`: transport closed or pipeline shut down
    /// - `TooManyOutstanding`: live entries are at the configured cap
    /// - `SequenceReused`: a tagged transport reissued a live sequence id
    ///
    /// On error no token is allocated.
    fn submit(&self, request: Self::Request) -> PipelineResult<Token>;

    /// Submit several requests back to back.
    ///
    /// The outstanding cap is checked for the whole batch before anything is
    /// sent. If the transport fails part-way, the tokens issued so far stay
    /// live (reachable through `drain`) and the error is returned.
    fn submit_batch(&self, requests: Vec<Self::Request>) -> PipelineResult<Vec<Token>>;

    /// Wait for the reply to `token` and consume the entry.
    ///
    /// Uses the configured default deadline if there is one.
    async fn collect(&self, token: Token) -> PipelineResult<Self::Reply>;

    /// Like `collect`, failing with `Timeout` once `deadline` elapses.
    /// A timed-out entry stays live and can be collected later.
    async fn collect_within(&self, token: Token, deadline: Duration)
        -> PipelineResult<Self::Reply>;

    /// Collect `tokens` in the given order.
    async fn collect_all(&self, tokens: Vec<Token>) -> Vec<PipelineResult<Self::Reply>>;

    /// Collect every entry live at call time, in increasing token order.
    async fn drain(&self) -> Vec<(Token, PipelineResult<Self::Reply>)>;

    /// Stop accepting requests and dispose of live entries per `policy`.
    async fn shutdown(&self, policy: ShutdownPolicy) -> ShutdownReport<Self::Reply>;
}
