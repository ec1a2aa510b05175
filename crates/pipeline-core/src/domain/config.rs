//! Pipeline configuration with validation.

use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cap on live correlation table entries.
pub const DEFAULT_MAX_OUTSTANDING: usize = 65_536;

/// Pipeline manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cap on live entries (pending plus resolved-but-uncollected).
    /// `None` disables backpressure.
    pub max_outstanding: Option<usize>,
    /// Deadline applied by `collect`. `None` waits indefinitely.
    pub default_collect_timeout: Option<Duration>,
    /// Upper bound on `shutdown(Flush)`. Entries still pending when it
    /// expires are cancelled.
    pub flush_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_outstanding: Some(DEFAULT_MAX_OUTSTANDING),
            default_collect_timeout: None,
            flush_timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Configuration with no cap on outstanding requests.
    pub fn unbounded() -> Self {
        Self {
            max_outstanding: None,
            ..Self::default()
        }
    }

    pub fn with_max_outstanding(mut self, limit: usize) -> Self {
        self.max_outstanding = Some(limit);
        self
    }

    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.default_collect_timeout = Some(timeout);
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = Some(timeout);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_outstanding == Some(0) {
            return Err(ConfigError::InvalidLimit(
                "max_outstanding cannot be 0".into(),
            ));
        }

        if self.default_collect_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidTimeout(
                "default_collect_timeout cannot be 0".into(),
            ));
        }

        if self.flush_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidTimeout(
                "flush_timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }
}
