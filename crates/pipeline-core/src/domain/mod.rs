//! # Domain Layer - Request Pipeline
//!
//! Pure types and the correlation table. Nothing here performs I/O.
//!
//! ## Components
//!
//! - `token`: Token, PipelineId, SequenceId, RequestKind
//! - `table`: CorrelationTable, PendingEntry, EntryState
//! - `error`: PipelineError, RemoteError, ConfigError
//! - `config`: PipelineConfig
//! - `stats`: PipelineStats, StatsSnapshot

pub mod config;
pub mod error;
pub mod stats;
pub mod table;
pub mod token;

pub use config::*;
pub use error::*;
pub use stats::*;
pub use table::*;
pub use token::*;
