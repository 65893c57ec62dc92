//! Relay Store
//!
//! Persistence and coordination layer of the work queue.
//!
//! - `repository`: the Job Record Store (`JobStore`) with PostgreSQL and in-memory backends
//! - `db`: connection pool and schema bootstrap
//! - `lifecycle`: applies state-machine transitions through the store and emits notifications
//! - `lease`: the lease claim protocol and expired-lease reaping
//! - `notify`: fire-and-forget change notification sinks

pub mod db;
pub mod error;
pub mod lease;
pub mod lifecycle;
pub mod notify;
pub mod repository;

pub use error::StoreError;
pub use lease::LeaseManager;
pub use lifecycle::{JobLifecycle, LifecycleError};
pub use notify::{BroadcastNotifier, Notifier, PgNotifier};
pub use repository::{IdempotencyScope, JobFilter, JobStore, MemoryJobStore, PgJobStore};
