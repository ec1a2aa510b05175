//! Pipeline error types.
//!
//! Transport-level faults are surfaced to the caller and never retried here.
//! A failure of one request never touches the entries of other tokens.

use super::token::{SequenceId, Token};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Application-level error returned by the remote side for one request.
///
/// The pipeline does not interpret it, only routes it to the matching token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Protocol error code
    pub code: u8,
    /// Symbolic error name (e.g. `BadAtom`)
    pub name: String,
    /// Optional detail from the remote side
    pub detail: Option<String>,
}

impl RemoteError {
    pub fn new(code: u8, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            detail: None,
        }
    }

    pub fn with_detail(code: u8, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} (code {}): {}", self.name, self.code, detail),
            None => write!(f, "{} (code {})", self.name, self.code),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Errors returned by the pipeline's caller-facing operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The transport's channel is closed or broken.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Token was never issued by this pipeline or was already collected.
    #[error("unknown token {0}")]
    UnknownToken(Token),

    /// Deadline elapsed before the reply arrived. The entry is still live.
    #[error("timed out after {waited:?} waiting for {token}")]
    Timeout { token: Token, waited: Duration },

    /// Live correlation table is at its configured cap.
    #[error("too many outstanding requests (limit {limit})")]
    TooManyOutstanding { limit: usize },

    /// The remote side answered this specific request with an error.
    #[error("request {token} failed remotely: {error}")]
    TransportReportedError { token: Token, error: RemoteError },

    /// The pipeline was shut down with the cancel policy before collection.
    #[error("request {0} cancelled by shutdown")]
    Cancelled(Token),

    /// The transport issued a sequence id that still names a live request.
    #[error("transport reused live sequence {0}")]
    SequenceReused(SequenceId),
}

impl PipelineError {
    /// Errors caused by misuse of the API rather than by the transport.
    pub fn is_caller_bug(&self) -> bool {
        matches!(self, Self::UnknownToken(_))
    }

    /// Errors after which the same call may reasonably be attempted again.
    ///
    /// A timed-out token can be collected again; a full table accepts new
    /// submits once the caller has collected something.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::TooManyOutstanding { .. })
    }

    /// Token this error refers to, if any.
    pub fn token(&self) -> Option<Token> {
        match self {
            Self::UnknownToken(token)
            | Self::Cancelled(token)
            | Self::Timeout { token, .. }
            | Self::TransportReportedError { token, .. } => Some(*token),
            _ => None,
        }
    }
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Configuration validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}
