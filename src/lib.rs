//! Profit Router Library
//!
//! Watches accumulated profit for a threshold inside a deadline window and
//! withdraws it, and periodically splits profit across configured
//! destinations.

pub mod app;
pub mod cli;
pub mod config;
pub mod distribution;
pub mod error;
pub mod scheduling;
pub mod services;
pub mod transfer;
pub mod withdrawal;

// Re-export commonly used types
pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
