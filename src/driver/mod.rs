//! Driver process supervision.
//!
//! This module manages one long-lived driver process that answers
//! evaluation requests over its stdio, one JSON line per message.
//!
//! Submodules:
//! - `spawner`: [`ChildHandle`](spawner::ChildHandle), process launch and
//!   liveness.
//! - `codec`: lossy, length-capped line framing for the diagnostic stream.
//! - `drainer`: background task collecting stderr lines into a channel.
//! - `readiness`: bounded polling for a line on the driver's stdout.
//! - `protocol`: versioned request/response envelopes.
//! - `evaluator`: the orchestrator tying the above together.

pub mod codec;
pub mod drainer;
pub mod evaluator;
pub mod protocol;
pub mod readiness;
pub mod spawner;

pub use evaluator::Evaluator;
