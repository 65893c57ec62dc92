//! Relay Core
//!
//! Core types and abstractions for the Relay work queue.
//!
//! This crate contains:
//! - Domain types: Core business entities (Job, JobStatus, JobEvent)
//! - Lifecycle: The pure job state machine (lease, ack, fail, expire)
//! - DTOs: Data transfer objects shared by the orchestrator, runner and CLI

pub mod domain;
pub mod dto;
pub mod lifecycle;
