//! Core domain types
//!
//! This module contains the core domain structures used across Relay services.
//! These types are shared between the orchestrator (submission and queries),
//! the runner (leasing and execution) and the store (persistence).

pub mod event;
pub mod job;
