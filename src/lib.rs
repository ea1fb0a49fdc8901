#![forbid(unsafe_code)]

//! Supervisor for a long-lived evaluation driver process.
//!
//! See [`driver::Evaluator`] for the entry point.

pub mod config;
pub mod driver;
pub mod errors;
pub mod models;

pub use config::DriverConfig;
pub use driver::Evaluator;
pub use errors::{EvalError, Result};
pub use models::request::{EvalOptions, Request, TangentMode};
pub use models::state::RunState;
