//! Adapters: transports implementing the outbound port, and the atom
//! interning workload they are exercised with.

pub mod atoms;
pub mod loopback;
pub mod simulated;

pub use atoms::{numbered_names, Atom, AtomReply, AtomRequest, AtomTable};
pub use loopback::LoopbackTransport;
pub use simulated::{LatencyModel, Responder, SimulatedTransport};
