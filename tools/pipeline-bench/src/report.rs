//! Benchmark results.

use crate::config::BenchConfig;
use pipeline_core::StatsSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Timing and counters of one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeReport {
    pub elapsed_us: u64,
    pub stats: StatsSnapshot,
}

impl ModeReport {
    pub fn new(elapsed: Duration, stats: StatsSnapshot) -> Self {
        Self {
            elapsed_us: elapsed.as_micros().min(u64::MAX as u128) as u64,
            stats,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us)
    }
}

/// Result of a full naive / batched / pipelined comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchReport {
    pub config: BenchConfig,
    pub naive: ModeReport,
    pub batched: ModeReport,
    pub pipelined: ModeReport,
    pub pipelined_over_naive: f64,
    pub naive_over_pipelined: f64,
    pub batched_over_naive: f64,
}

fn ratio(numerator: &ModeReport, denominator: &ModeReport) -> f64 {
    // Clamp so a zero-duration run cannot divide by zero
    numerator.elapsed_us as f64 / denominator.elapsed_us.max(1) as f64
}

impl BenchReport {
    pub fn new(
        config: BenchConfig,
        naive: ModeReport,
        batched: ModeReport,
        pipelined: ModeReport,
    ) -> Self {
        Self {
            pipelined_over_naive: ratio(&pipelined, &naive),
            naive_over_pipelined: ratio(&naive, &pipelined),
            batched_over_naive: ratio(&batched, &naive),
            config,
            naive,
            batched,
            pipelined,
        }
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} requests, {}ms latency (+{}ms jitter), {} replies",
            self.config.requests, self.config.latency_ms, self.config.jitter_ms, self.config.ordering
        )?;
        writeln!(f, "{:<10} {:>14} {:>10}", "mode", "elapsed", "collected")?;
        for (name, mode) in [
            ("naive", &self.naive),
            ("batched", &self.batched),
            ("pipelined", &self.pipelined),
        ] {
            writeln!(
                f,
                "{:<10} {:>14} {:>10}",
                name,
                format!("{:.3?}", mode.elapsed()),
                mode.stats.collected
            )?;
        }
        writeln!(f, "pipelined/naive = {:.4}", self.pipelined_over_naive)?;
        writeln!(f, "naive/pipelined = {:.1}", self.naive_over_pipelined)?;
        write!(f, "batched/naive   = {:.4}", self.batched_over_naive)
    }
}
