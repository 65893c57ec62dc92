//! Scheduler layer for the runner
//!
//! Two loops share one `LeaseManager`: the poller leases and dispatches
//! pending jobs, the reaper returns jobs with lapsed leases to pending.

pub mod poller;
pub mod reaper;

pub use poller::JobPoller;
pub use reaper::LeaseReaper;
