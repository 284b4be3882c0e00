//! Target scheduler.
//!
//! Polls every target at its own interval under one global concurrency
//! bound, backs off failing targets and binds drivers from device identity.
//! See [`TargetScheduler`] for the task and [`SchedulerHandle`] for talking
//! to it.

mod backoff;
mod handle;
mod messages;
mod poll;
mod service;
mod state;

pub use backoff::{BackoffPolicy, DEFAULT_BASE_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MULTIPLIER};
pub use handle::SchedulerHandle;
pub use messages::SchedulerCommand;
pub use service::{DEFAULT_COMMAND_CAPACITY, TICK_INTERVAL, TargetScheduler};
pub use state::{FORCED_REFRESH_FAILURES, TargetPhase, TargetSnapshot, TargetState};
