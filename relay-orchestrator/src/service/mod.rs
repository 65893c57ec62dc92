//! Service Layer
//!
//! Business logic between the HTTP handlers and the job store.

pub mod job;
pub mod metrics;
