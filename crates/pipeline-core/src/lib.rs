//! # Request Pipeline
//!
//! Lets a client issue many requests over one connection without waiting for
//! each reply before sending the next. Every submit returns a [`Token`]; the
//! reply is claimed later with `collect`, all at once with `drain`, or
//! handed back by a flushing `shutdown`.
//!
//! ## Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | Tokens unique and strictly increasing per pipeline | `domain/table.rs` - `insert()` |
//! | A token is collected at most once | `domain/table.rs` - `take()` removes the entry |
//! | A reply resolves at most one entry | `domain/table.rs` - `resolve_next()` / `resolve_tagged()` |
//! | Submit never waits on the network | `service.rs` - `submit()` only calls `Transport::send` |
//! | Collect of A never waits on B | `service.rs` - per-entry settle signal |
//! | Live entries bounded by `max_outstanding` | `service.rs` - checked under the table lock |
//!
//! ## Entry Lifecycle
//!
//! ```text
//! submit ──→ [PENDING] ──reply──→ [RESOLVED] ──collect──→ (removed)
//!                │    └──error──→ [FAILED]   ──collect──→ (removed)
//!                └── shutdown(Cancel) ──→ (removed, collect → Cancelled)
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  adapters/ - SimulatedTransport, LoopbackTransport, atom table  │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - PipelineApi trait                          │
//! │  ports/outbound.rs - Transport trait, Delivery, ReplyOrdering   │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  domain/token.rs  - Token, PipelineId, SequenceId               │
//! │  domain/table.rs  - CorrelationTable, PendingEntry              │
//! │  domain/error.rs  - PipelineError, RemoteError                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use pipeline_core::{AtomRequest, AtomTable, PipelineApi, PipelineConfig, PipelineManager, SimulatedTransport};
//!
//! let transport = Arc::new(SimulatedTransport::fifo(Arc::new(AtomTable::new()), Duration::from_millis(1)));
//! let pipeline = PipelineManager::new(transport, PipelineConfig::default())?;
//!
//! let tokens: Vec<_> = names.into_iter().map(|n| pipeline.submit(AtomRequest::intern(n))).collect::<Result<_, _>>()?;
//! let replies = pipeline.drain().await;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
mod resolver;
pub mod service;

pub use adapters::{
    numbered_names, Atom, AtomReply, AtomRequest, AtomTable, LatencyModel, LoopbackTransport,
    Responder, SimulatedTransport,
};
pub use domain::{
    ConfigError, CorrelationTable, EntryState, PipelineConfig, PipelineError, PipelineId,
    PipelineResult, PipelineStats, RemoteError, RequestKind, SequenceId, StatsSnapshot, Token,
    DEFAULT_MAX_OUTSTANDING,
};
pub use ports::{
    Delivery, PipelineApi, ReplyOrdering, ShutdownPolicy, ShutdownReport, Transport,
    TransportError,
};
pub use service::PipelineManager;
