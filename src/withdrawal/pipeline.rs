//! One-shot withdrawal pipeline
//!
//! quote → balance check → submit → confirmations. The first failing step
//! ends the attempt; nothing is retried.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::scheduling::Clock;
use crate::transfer::{SendOutcome, Transfer, TransferDispatcher, TransferRequest};

/// What started a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalKind {
    /// A monitored window reached its threshold
    Threshold,
    /// Operator override
    Forced,
    /// Periodic stablecoin sweep
    Stablecoin,
}

impl std::fmt::Display for WithdrawalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalKind::Threshold => write!(f, "threshold"),
            WithdrawalKind::Forced => write!(f, "forced"),
            WithdrawalKind::Stablecoin => write!(f, "stablecoin"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    Completed,
    Failed,
}

/// Audit record of one withdrawal attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub id: Uuid,
    pub kind: WithdrawalKind,
    /// Window that triggered it, if any
    pub window_id: Option<Uuid>,
    pub triggered_at: DateTime<Utc>,
    pub amount_usd: Decimal,
    pub asset: String,
    /// Asset units per USD at quote time
    pub rate: Option<Decimal>,
    pub amount_asset: Option<Decimal>,
    pub transfer: Option<Transfer>,
    pub outcome: WithdrawalOutcome,
    pub error: Option<String>,
}

impl WithdrawalRecord {
    pub fn is_completed(&self) -> bool {
        self.outcome == WithdrawalOutcome::Completed
    }

    pub fn summary(&self) -> String {
        let amount = match self.amount_asset {
            Some(units) => format!("{} {} (${})", units, self.asset, self.amount_usd),
            None => format!("${} in {}", self.amount_usd, self.asset),
        };
        match (&self.transfer, &self.error) {
            (Some(t), None) => format!("{} sent to {} (tx: {})", amount, t.destination_address, t.id),
            (Some(t), Some(e)) => format!("{} (tx: {}) failed: {}", amount, t.id, e),
            (None, Some(e)) => format!("{} failed: {}", amount, e),
            (None, None) => amount,
        }
    }
}

/// Drives one withdrawal to a fixed destination
pub struct WithdrawalPipeline {
    dispatcher: Arc<TransferDispatcher>,
    request: TransferRequest,
    asset_decimals: u32,
    clock: Arc<dyn Clock>,
}

impl WithdrawalPipeline {
    pub fn new(
        dispatcher: Arc<TransferDispatcher>,
        request: TransferRequest,
        asset_decimals: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            request,
            asset_decimals,
            clock,
        }
    }

    pub fn request(&self) -> &TransferRequest {
        &self.request
    }

    /// Run the pipeline for `amount_usd`. Failures are captured in the
    /// returned record rather than propagated.
    pub async fn execute(
        &self,
        kind: WithdrawalKind,
        window_id: Option<Uuid>,
        amount_usd: Decimal,
    ) -> WithdrawalRecord {
        let mut record = WithdrawalRecord {
            id: Uuid::new_v4(),
            kind,
            window_id,
            triggered_at: self.clock.now(),
            amount_usd,
            asset: self.request.asset.clone(),
            rate: None,
            amount_asset: None,
            transfer: None,
            outcome: WithdrawalOutcome::Failed,
            error: None,
        };

        info!(
            "Starting {} withdrawal of ${} to {} on {}",
            kind, amount_usd, self.request.destination_address, self.request.network
        );

        match self.run_steps(&mut record).await {
            Ok(()) => {
                record.outcome = WithdrawalOutcome::Completed;
                info!("Withdrawal {} completed: {}", record.id, record.summary());
            }
            Err(e) => {
                record.error = Some(e.to_string());
                error!("Withdrawal {} failed: {}", record.id, e);
            }
        }

        record
    }

    async fn run_steps(&self, record: &mut WithdrawalRecord) -> Result<()> {
        let quote = self
            .dispatcher
            .quote(record.amount_usd, &self.request.asset, self.asset_decimals)
            .await?;
        record.rate = Some(quote.rate);
        record.amount_asset = Some(quote.amount);

        let available = self
            .dispatcher
            .available_balance(&self.request.asset, &self.request.network)
            .await?;
        if available < quote.amount {
            return Err(Error::InsufficientBalance {
                asset: self.request.asset.clone(),
                available,
                required: quote.amount,
            });
        }

        match self.dispatcher.send(&self.request, quote.amount).await {
            SendOutcome::Confirmed(transfer) => {
                record.transfer = Some(transfer);
                Ok(())
            }
            SendOutcome::Unconfirmed(transfer, e) => {
                record.transfer = Some(transfer);
                Err(e)
            }
            SendOutcome::NotSubmitted(e) => Err(e),
        }
    }
}
