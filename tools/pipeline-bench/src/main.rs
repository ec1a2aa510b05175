//! atom-bench: compare naive, batched and pipelined atom interning.

use anyhow::{Context, Result};
use clap::Parser;
use pipeline_bench::{run_benchmark, BenchConfig, DEFAULT_LATENCY_MS, DEFAULT_REQUESTS};
use pipeline_core::ReplyOrdering;
use pipeline_telemetry::{init_telemetry, TelemetryConfig};

/// Compare naive, batched and pipelined request patterns over a simulated
/// high-latency connection
#[derive(Parser, Debug)]
#[command(name = "atom-bench")]
#[command(about = "Benchmark request pipelining with an atom-interning workload")]
struct Args {
    /// Number of names to intern in each mode
    #[arg(short = 'n', long, env = "PIPELINE_BENCH_REQUESTS", default_value_t = DEFAULT_REQUESTS)]
    requests: usize,

    /// Simulated round-trip latency in milliseconds
    #[arg(short, long, env = "PIPELINE_BENCH_LATENCY_MS", default_value_t = DEFAULT_LATENCY_MS)]
    latency_ms: u64,

    /// Extra random latency per request in milliseconds
    #[arg(short, long, env = "PIPELINE_BENCH_JITTER_MS", default_value_t = 0)]
    jitter_ms: u64,

    /// Reply ordering of the simulated server (fifo or tagged)
    #[arg(short, long, env = "PIPELINE_BENCH_ORDERING", default_value_t = ReplyOrdering::Fifo)]
    ordering: ReplyOrdering,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn bench_config(&self) -> BenchConfig {
        BenchConfig {
            requests: self.requests,
            latency_ms: self.latency_ms,
            jitter_ms: self.jitter_ms,
            ordering: self.ordering,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _telemetry = init_telemetry(TelemetryConfig::for_tool("atom-bench"))
        .context("Failed to initialize telemetry")?;

    let config = args.bench_config();
    config.validate().context("Invalid benchmark configuration")?;

    let report = run_benchmark(&config)
        .await
        .context("Benchmark run failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        println!("{}", json);
    } else {
        println!("{}", report);
    }

    Ok(())
}
