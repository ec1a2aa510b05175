//! Benchmark configuration.

use pipeline_core::{LatencyModel, ReplyOrdering};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_REQUESTS: usize = 500;
pub const DEFAULT_LATENCY_MS: u64 = 1;

/// Upper bound on requests per run; every mode interns this many names.
pub const MAX_REQUESTS: usize = 1_000_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BenchConfigError {
    #[error("request count must be between 1 and {max}, got {got}")]
    RequestCount { got: usize, max: usize },

    #[error("latency must be non-zero for the comparison to mean anything")]
    ZeroLatency,
}

/// Parameters of one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Number of names interned by each mode
    pub requests: usize,
    /// Simulated per-request round-trip latency
    pub latency_ms: u64,
    /// Extra uniformly random latency per request
    pub jitter_ms: u64,
    /// Whether the simulated server answers in order or per request
    pub ordering: ReplyOrdering,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            requests: DEFAULT_REQUESTS,
            latency_ms: DEFAULT_LATENCY_MS,
            jitter_ms: 0,
            ordering: ReplyOrdering::Fifo,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<(), BenchConfigError> {
        if self.requests == 0 || self.requests > MAX_REQUESTS {
            return Err(BenchConfigError::RequestCount {
                got: self.requests,
                max: MAX_REQUESTS,
            });
        }
        if self.latency_ms == 0 {
            return Err(BenchConfigError::ZeroLatency);
        }
        Ok(())
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn latency_model(&self) -> LatencyModel {
        if self.jitter_ms == 0 {
            LatencyModel::Fixed(self.latency())
        } else {
            LatencyModel::Jittered {
                base: self.latency(),
                jitter: Duration::from_millis(self.jitter_ms),
            }
        }
    }
}
