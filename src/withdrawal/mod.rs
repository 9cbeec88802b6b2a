//! Threshold-triggered withdrawal

pub mod monitor;
pub mod pipeline;
pub mod window;

pub use monitor::{MonitorStatus, PollOutcome, WithdrawalMonitor, WithdrawalStats};
pub use pipeline::{WithdrawalKind, WithdrawalOutcome, WithdrawalPipeline, WithdrawalRecord};
pub use window::{Observation, WindowSnapshot, WindowStatus, WithdrawalWindow};
