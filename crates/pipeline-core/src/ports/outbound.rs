//! Outbound (Driven) port: the transport the pipeline sends through.
//!
//! A transport is one logical connection. It assigns every sent request an
//! order-of-issuance [`SequenceId`] and hands replies back one at a time in
//! arrival order. It is consumed by the pipeline manager; its wire format is
//! none of the pipeline's business.

use crate::domain::{PipelineError, RemoteError, RequestKind, SequenceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How replies relate to issuance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyOrdering {
    /// Replies arrive in exactly the order requests were sent. The pipeline
    /// matches each reply to the oldest pending request and ignores its id.
    #[default]
    Fifo,
    /// Replies may arrive in any order; each carries the sequence id of the
    /// request it answers and is routed by that id.
    Tagged,
}

impl fmt::Display for ReplyOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fifo => write!(f, "fifo"),
            Self::Tagged => write!(f, "tagged"),
        }
    }
}

impl FromStr for ReplyOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "tagged" => Ok(Self::Tagged),
            other => Err(format!("unknown reply ordering '{}' (expected fifo or tagged)", other)),
        }
    }
}

/// One reply (or per-request error) handed back by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<R> {
    /// Sequence id of the request this answers
    pub sequence: SequenceId,
    /// Reply payload or the remote side's error for this request
    pub outcome: Result<R, RemoteError>,
}

impl<R> Delivery<R> {
    pub fn reply(sequence: SequenceId, reply: R) -> Self {
        Self {
            sequence,
            outcome: Ok(reply),
        }
    }

    pub fn error(sequence: SequenceId, error: RemoteError) -> Self {
        Self {
            sequence,
            outcome: Err(error),
        }
    }
}

/// Transport-level errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("send failed: {0}")]
    SendFailed(String),
    /// A receive failed but the connection may recover
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

impl From<TransportError> for PipelineError {
    fn from(err: TransportError) -> Self {
        PipelineError::TransportUnavailable(err.to_string())
    }
}

/// A single ordered request/reply connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Request payload
    type Request: RequestKind + Send + 'static;
    /// Reply payload
    type Reply: Send + 'static;

    /// Ordering guarantee of this transport's replies.
    fn ordering(&self) -> ReplyOrdering;

    /// Enqueue a request without waiting for its reply.
    ///
    /// Must not block on I/O. Returns the sequence id assigned to the
    /// request. A `Tagged` transport must keep the ids of requests still
    /// awaiting replies distinct; a `Fifo` transport may repeat them.
    fn send(&self, request: Self::Request) -> Result<SequenceId, TransportError>;

    /// Wait for the next reply in arrival order.
    ///
    /// Returns `Err(TransportError::Closed)` once the connection is gone and
    /// no buffered replies remain. Other errors are retried with backoff
    /// until too many arrive in a row. Must be cancel-safe.
    async fn receive(&self) -> Result<Delivery<Self::Reply>, TransportError>;

    /// Release the connection. Later sends fail with `Closed`.
    fn close(&self);
}
