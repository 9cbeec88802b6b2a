//! Distribution run records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::{DistributionPlan, OPERATIONAL_BUCKET};
use crate::transfer::{Transfer, TransferStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    /// External transfer to a wallet on one network
    Transfer,
    /// Internal reinvestment bucket; nothing leaves custody
    Reinvestment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Confirmed,
    Failed,
    /// Amount too small to send at the asset's precision
    Skipped,
}

impl From<TransferStatus> for LegStatus {
    fn from(status: TransferStatus) -> Self {
        match status {
            TransferStatus::Confirmed => LegStatus::Confirmed,
            TransferStatus::Pending | TransferStatus::Failed => LegStatus::Failed,
        }
    }
}

impl std::fmt::Display for LegStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LegStatus::Confirmed => write!(f, "confirmed"),
            LegStatus::Failed => write!(f, "failed"),
            LegStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One destination's transfer within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    pub destination_id: String,
    pub kind: LegKind,
    /// Network for transfers, strategy name for reinvestment
    pub target: String,
    pub amount_usd: Decimal,
    pub asset: Option<String>,
    pub amount_asset: Option<Decimal>,
    pub transfer: Option<Transfer>,
    pub status: LegStatus,
    pub error: Option<String>,
}

impl Leg {
    pub fn reinvestment(destination_id: &str, strategy: &str, amount_usd: Decimal) -> Self {
        Self {
            destination_id: destination_id.to_string(),
            kind: LegKind::Reinvestment,
            target: strategy.to_string(),
            amount_usd,
            asset: None,
            amount_asset: None,
            transfer: None,
            status: LegStatus::Confirmed,
            error: None,
        }
    }

    pub fn was_attempted(&self) -> bool {
        self.status != LegStatus::Skipped
    }
}

/// A leg as it would be executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedLeg {
    pub destination_id: String,
    pub kind: LegKind,
    pub target: String,
    pub amount_usd: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    PartiallyFailed,
    Failed,
}

impl RunOutcome {
    /// `Completed` when every attempted leg confirmed, `Failed` when none
    /// did, otherwise `PartiallyFailed`
    pub fn classify(legs: &[Leg]) -> Self {
        let attempted = legs.iter().filter(|l| l.was_attempted()).count();
        let confirmed = legs
            .iter()
            .filter(|l| l.status == LegStatus::Confirmed)
            .count();

        if confirmed == attempted {
            RunOutcome::Completed
        } else if confirmed == 0 {
            RunOutcome::Failed
        } else {
            RunOutcome::PartiallyFailed
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::PartiallyFailed => write!(f, "partially failed"),
            RunOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Audit record of one distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionRun {
    pub id: Uuid,
    pub triggered_at: DateTime<Utc>,
    pub trigger: RunTrigger,
    pub plan: DistributionPlan,
    /// In allocation order, fanned out per network or strategy
    pub legs: Vec<Leg>,
    pub outcome: RunOutcome,
}

impl DistributionRun {
    /// USD value of confirmed legs
    pub fn distributed_usd(&self) -> Decimal {
        self.legs
            .iter()
            .filter(|l| l.status == LegStatus::Confirmed)
            .map(|l| l.amount_usd)
            .sum()
    }

    pub fn failed_legs(&self) -> impl Iterator<Item = &Leg> {
        self.legs.iter().filter(|l| l.status == LegStatus::Failed)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Distribution of ${} {}.",
            self.plan.total_usd, self.outcome
        )];

        for allocation in &self.plan.allocations {
            let legs: Vec<&Leg> = self
                .legs
                .iter()
                .filter(|l| l.destination_id == allocation.destination_id)
                .collect();
            let confirmed = legs
                .iter()
                .filter(|l| l.status == LegStatus::Confirmed)
                .count();
            lines.push(format!(
                "{}: ${} ({}/{} legs confirmed)",
                allocation.destination_id,
                allocation.amount_usd,
                confirmed,
                legs.len()
            ));
        }

        if self.plan.unallocated_usd > Decimal::ZERO {
            lines.push(format!("{}: ${}", OPERATIONAL_BUCKET, self.plan.unallocated_usd));
        }

        for leg in self.failed_legs() {
            lines.push(format!(
                "failed {} on {}: {}",
                leg.destination_id,
                leg.target,
                leg.error.as_deref().unwrap_or("unknown error")
            ));
        }

        lines.join("\n")
    }
}
