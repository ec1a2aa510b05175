//! # Pipeline Bench
//!
//! Measures what pipelining buys over a connection with per-request
//! latency. Interns `NAME0..NAME{N-1}` three ways against a simulated atom
//! server and reports how long each took:
//!
//! | Mode | Pattern | Expected wall time |
//! |------|---------|--------------------|
//! | naive | submit, collect, repeat | about N x latency |
//! | batched | `submit_batch`, `collect_all` | about one latency |
//! | pipelined | submit all, `drain` | about one latency |
//!
//! The binary `atom-bench` wraps [`run_benchmark`] with a CLI.

pub mod config;
pub mod harness;
pub mod report;

pub use config::{BenchConfig, BenchConfigError, DEFAULT_LATENCY_MS, DEFAULT_REQUESTS};
pub use harness::{
    intern_batched, intern_naive, intern_pipelined, run_benchmark, run_mode, BenchError, Mode,
};
pub use report::{BenchReport, ModeReport};
