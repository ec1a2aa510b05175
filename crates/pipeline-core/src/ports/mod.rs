//! Ports layer for the request pipeline.
//!
//! - Inbound (Driving) port: `PipelineApi`, used by callers
//! - Outbound (Driven) port: `Transport`, the connection replies come from

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
