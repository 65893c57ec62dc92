//! Data Transfer Objects for inter-service communication
//!
//! DTOs used between the orchestrator API and its clients (the CLI, dashboards).
//! They are lightweight views of domain entities shaped for the wire.

pub mod job;
pub mod metrics;
