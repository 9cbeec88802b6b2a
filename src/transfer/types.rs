//! Transfer records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle of a submitted transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransferStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, TransferStatus::Confirmed | TransferStatus::Failed)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Confirmed => write!(f, "confirmed"),
            TransferStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Where a transfer goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub asset: String,
    pub network: String,
    pub destination_address: String,
}

impl TransferRequest {
    pub fn new(
        asset: impl Into<String>,
        network: impl Into<String>,
        destination_address: impl Into<String>,
    ) -> Self {
        Self {
            asset: asset.into(),
            network: network.into(),
            destination_address: destination_address.into(),
        }
    }
}

/// One asset transfer, as reported by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Executor-assigned id (tx hash or equivalent)
    pub id: String,

    pub asset: String,

    pub network: String,

    pub destination_address: String,

    /// Amount in asset units
    pub amount: Decimal,

    pub status: TransferStatus,

    /// Never decreases
    pub confirmations: u32,

    pub submitted_at: DateTime<Utc>,
}

impl Transfer {
    /// A freshly submitted transfer
    pub fn pending(
        id: impl Into<String>,
        request: &TransferRequest,
        amount: Decimal,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            asset: request.asset.clone(),
            network: request.network.clone(),
            destination_address: request.destination_address.clone(),
            amount,
            status: TransferStatus::Pending,
            confirmations: 0,
            submitted_at,
        }
    }

    /// Record an observed confirmation count. Lower counts than already
    /// seen are ignored.
    pub fn record_confirmations(&mut self, count: u32) -> Result<()> {
        self.ensure_pending("record confirmations")?;
        self.confirmations = self.confirmations.max(count);
        Ok(())
    }

    pub fn confirm(&mut self) -> Result<()> {
        self.ensure_pending("confirm")?;
        self.status = TransferStatus::Confirmed;
        Ok(())
    }

    pub fn fail(&mut self) -> Result<()> {
        self.ensure_pending("fail")?;
        self.status = TransferStatus::Failed;
        Ok(())
    }

    fn ensure_pending(&self, action: &str) -> Result<()> {
        if self.status.is_final() {
            return Err(Error::InvalidTransition(format!(
                "cannot {} transfer {}: already {}",
                action, self.id, self.status
            )));
        }
        Ok(())
    }
}
