//! Scheduling plumbing shared by the monitor and the distribution cycles
//!
//! - [`Clock`]: injectable wall time
//! - [`TaskHandle`] / [`spawn_periodic`]: cancellable recurring tasks
//! - [`OverlapGuard`]: skip-not-queue policy for recurring runs

pub mod clock;
pub mod guard;
pub mod task;

pub use clock::{Clock, ManualClock, TokioClock};
pub use guard::{CycleGuard, OverlapGuard};
pub use task::{delay_until_aligned, spawn_periodic, TaskHandle};
