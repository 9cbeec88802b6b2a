//! Error types for the profit router

use rust_decimal::Decimal;
use thiserror::Error;

use crate::withdrawal::WindowStatus;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the profit router
#[derive(Error, Debug)]
pub enum Error {
    // Setup errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Ordering / misuse errors
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Window is closed (status: {0})")]
    WindowClosed(WindowStatus),

    #[error("Cycle already in progress: {0}")]
    CycleBusy(String),

    // External dependency errors
    #[error("Profit source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Exchange rate {from}->{to} unavailable: {reason}")]
    RateUnavailable {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Transfer execution failed: {0}")]
    ExecutionError(String),

    #[error(
        "Transfer {transfer_id} timed out at {confirmations}/{required} confirmations"
    )]
    ConfirmationTimeout {
        transfer_id: String,
        confirmations: u32,
        required: u32,
    },

    // Business rule errors
    #[error("Insufficient balance: {available} {asset} available, {required} {asset} required")]
    InsufficientBalance {
        asset: String,
        available: Decimal,
        required: Decimal,
    },

    // Best-effort collaborators
    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("Ledger write failed: {0}")]
    Ledger(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Failure of an external collaborator. Reported and notified, never
    /// retried within the same run.
    pub fn is_external_failure(&self) -> bool {
        matches!(
            self,
            Error::SourceUnavailable(_)
                | Error::RateUnavailable { .. }
                | Error::ExecutionError(_)
                | Error::ConfirmationTimeout { .. }
        )
    }

    /// Ordering or state-machine misuse by the caller
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Error::InvalidTransition(_) | Error::WindowClosed(_) | Error::CycleBusy(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from HTTP client errors (notification delivery)
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Notification(e.to_string())
    }
}
