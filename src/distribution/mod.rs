//! Periodic profit distribution

pub mod plan;
pub mod scheduler;
pub mod types;

pub use plan::{
    compute_plan, split_evenly, validate_allocations, Allocation, AllocationEntry, DistributionPlan,
    OPERATIONAL_BUCKET,
};
pub use scheduler::{CycleResult, DistributionScheduler, DistributionStats, StablecoinStats};
pub use types::{DistributionRun, Leg, LegKind, LegStatus, PlannedLeg, RunOutcome, RunTrigger};
