//! Token and identifier types.
//!
//! A [`Token`] names exactly one outstanding request. It is handed out by
//! `submit` and consumed by `collect`; it is never reused by the pipeline
//! that issued it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one pipeline instance.
///
/// Uses UUID v7 so that instance ids sort by creation time in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(Uuid);

impl PipelineId {
    /// Generate a new pipeline id (UUID v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Short form for log lines (first 8 hex digits).
    pub fn short(&self) -> String {
        let mut s = self.0.simple().to_string();
        s.truncate(8);
        s
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order-of-issuance identifier assigned by a transport to a sent request.
///
/// Tagged transports echo it back on the matching reply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceId(pub u64);

impl SequenceId {
    /// The raw sequence value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle correlating one submitted request with its eventual reply.
///
/// `sequence` is the pipeline's own widened issuance counter. It grows by
/// one per accepted request, in the same order the transport sent them, so
/// comparing two tokens of one pipeline compares their issuance order.
/// `kind` is the request's logical kind and exists for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pipeline: PipelineId,
    sequence: u64,
    kind: &'static str,
}

impl Token {
    pub(crate) fn new(pipeline: PipelineId, sequence: u64, kind: &'static str) -> Self {
        Self {
            pipeline,
            sequence,
            kind,
        }
    }

    /// Pipeline that issued this token.
    pub fn pipeline(&self) -> PipelineId {
        self.pipeline
    }

    /// Issuance ordinal within the pipeline (starts at 1).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Logical kind of the originating request.
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.pipeline.as_uuid().cmp(other.pipeline.as_uuid()))
            .then_with(|| self.kind.cmp(other.kind))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.pipeline.short(), self.sequence, self.kind)
    }
}

/// Implemented by every request type that can travel through a pipeline.
pub trait RequestKind {
    /// Short static name of the request kind, e.g. `"InternAtom"`.
    fn kind(&self) -> &'static str;
}
