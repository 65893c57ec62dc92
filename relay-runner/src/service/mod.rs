//! Service layer
//!
//! Payload interpretation and execution. The execution service is
//! trait-based so the poller can be driven with test executors.

mod execution;
mod payload;

pub use execution::{ExecutionError, ExecutionService, PayloadExecutor};
