//! Run lifecycle: phase machine, context, and the orchestrator.

pub mod context;
pub mod harness;
pub mod phase;

pub use context::{CancelToken, RunContext};
pub use harness::{Harness, with_real_backends};
pub use phase::RunPhase;
