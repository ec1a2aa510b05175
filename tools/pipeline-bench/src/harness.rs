//! The three usage patterns being compared, and the runner that times them.
//!
//! Each pattern interns the same list of names through a [`PipelineApi`].
//! They differ only in when they wait:
//!
//! ```text
//! naive      submit ─ collect ─ submit ─ collect ─ ...   N round trips
//! batched    submit_batch(N) ─ collect_all(N)            1 round trip
//! pipelined  submit ─ submit ─ ... ─ drain               1 round trip
//! ```

use crate::config::BenchConfig;
use crate::report::{BenchReport, ModeReport};
use pipeline_core::{
    Atom, AtomReply, AtomRequest, AtomTable, ConfigError, PipelineApi, PipelineConfig,
    PipelineError, PipelineManager, ShutdownPolicy, SimulatedTransport,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("pipeline configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("request failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("expected an atom for '{name}', got {reply:?}")]
    UnexpectedReply { name: String, reply: AtomReply },

    #[error("{mode} produced different atoms than naive")]
    Mismatch { mode: &'static str },
}

/// Usage pattern under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Naive,
    Batched,
    Pipelined,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Naive, Mode::Batched, Mode::Pipelined];

    pub fn name(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Batched => "batched",
            Self::Pipelined => "pipelined",
        }
    }
}

fn expect_atom(name: &str, reply: AtomReply) -> Result<Atom, BenchError> {
    reply.atom().ok_or_else(|| BenchError::UnexpectedReply {
        name: name.to_string(),
        reply,
    })
}

/// One round trip per name: collect each reply before sending the next.
pub async fn intern_naive<P>(pipeline: &P, names: &[String]) -> Result<Vec<Atom>, BenchError>
where
    P: PipelineApi<Request = AtomRequest, Reply = AtomReply>,
{
    let mut atoms = Vec::with_capacity(names.len());
    for name in names {
        let token = pipeline.submit(AtomRequest::intern(name.as_str()))?;
        let reply = pipeline.collect(token).await?;
        atoms.push(expect_atom(name, reply)?);
    }
    Ok(atoms)
}

/// Submit the whole list in one batch, then collect in the same order.
pub async fn intern_batched<P>(pipeline: &P, names: &[String]) -> Result<Vec<Atom>, BenchError>
where
    P: PipelineApi<Request = AtomRequest, Reply = AtomReply>,
{
    let requests = names
        .iter()
        .map(|name| AtomRequest::intern(name.as_str()))
        .collect();
    let tokens = pipeline.submit_batch(requests)?;

    let replies = pipeline.collect_all(tokens).await;
    names
        .iter()
        .zip(replies)
        .map(|(name, reply)| expect_atom(name, reply?))
        .collect()
}

/// Submit every name, then drain.
pub async fn intern_pipelined<P>(pipeline: &P, names: &[String]) -> Result<Vec<Atom>, BenchError>
where
    P: PipelineApi<Request = AtomRequest, Reply = AtomReply>,
{
    for name in names {
        pipeline.submit(AtomRequest::intern(name.as_str()))?;
    }

    let drained = pipeline.drain().await;
    names
        .iter()
        .zip(drained)
        .map(|(name, (_, reply))| expect_atom(name, reply?))
        .collect()
}

/// Run one mode against a fresh server and connection.
pub async fn run_mode(
    config: &BenchConfig,
    mode: Mode,
    names: &[String],
) -> Result<(ModeReport, Vec<Atom>), BenchError> {
    let transport = Arc::new(SimulatedTransport::new(
        Arc::new(AtomTable::new()),
        config.latency_model(),
        config.ordering,
    ));
    let pipeline = PipelineManager::new(transport, PipelineConfig::unbounded())?;

    let start = Instant::now();
    let atoms = match mode {
        Mode::Naive => intern_naive(&pipeline, names).await,
        Mode::Batched => intern_batched(&pipeline, names).await,
        Mode::Pipelined => intern_pipelined(&pipeline, names).await,
    };
    let elapsed = start.elapsed();

    let report = pipeline.shutdown(ShutdownPolicy::Cancel).await;
    debug!(mode = mode.name(), cancelled = report.cancelled.len(), "Run finished");
    let atoms = atoms?;

    info!(
        mode = mode.name(),
        requests = names.len(),
        elapsed_us = elapsed.as_micros() as u64,
        "Mode complete"
    );

    Ok((
        ModeReport::new(elapsed, pipeline.stats_snapshot()),
        atoms,
    ))
}

/// Time all three modes and check they agree on the atoms produced.
pub async fn run_benchmark(config: &BenchConfig) -> Result<BenchReport, BenchError> {
    let names = pipeline_core::numbered_names(config.requests);
    info!(
        requests = config.requests,
        latency_ms = config.latency_ms,
        jitter_ms = config.jitter_ms,
        ordering = %config.ordering,
        "Starting benchmark"
    );

    let (naive, baseline) = run_mode(config, Mode::Naive, &names).await?;

    let (batched, atoms) = run_mode(config, Mode::Batched, &names).await?;
    if atoms != baseline {
        return Err(BenchError::Mismatch { mode: Mode::Batched.name() });
    }

    let (pipelined, atoms) = run_mode(config, Mode::Pipelined, &names).await?;
    if atoms != baseline {
        return Err(BenchError::Mismatch { mode: Mode::Pipelined.name() });
    }

    Ok(BenchReport::new(config.clone(), naive, batched, pipelined))
}
