//! Distribution plan calculation
//!
//! Pure functions over `Decimal`. Amounts are truncated toward zero at the
//! configured precision, so allocations never sum past the total; whatever
//! is left (unclaimed percentage plus rounding dust) is reported as the
//! operational bucket.

use std::collections::HashSet;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the bucket holding the unallocated remainder
pub const OPERATIONAL_BUCKET: &str = "operational";

/// One destination's configured share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub destination_id: String,
    pub percentage: Decimal,
}

impl AllocationEntry {
    pub fn new(destination_id: impl Into<String>, percentage: Decimal) -> Self {
        Self {
            destination_id: destination_id.into(),
            percentage,
        }
    }
}

/// One destination's share of a concrete total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub destination_id: String,
    pub percentage: Decimal,
    pub amount_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPlan {
    pub total_usd: Decimal,
    /// Same order as the allocation table
    pub allocations: Vec<Allocation>,
    /// `total_usd` minus the sum of all allocations
    pub unallocated_usd: Decimal,
    /// Percentage no destination claims
    pub unallocated_pct: Decimal,
}

impl DistributionPlan {
    pub fn allocated_usd(&self) -> Decimal {
        self.allocations.iter().map(|a| a.amount_usd).sum()
    }

    pub fn allocation(&self, destination_id: &str) -> Option<&Allocation> {
        self.allocations
            .iter()
            .find(|a| a.destination_id == destination_id)
    }
}

/// Reject negative shares, duplicate ids, and tables over 100%
pub fn validate_allocations(table: &[AllocationEntry]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut sum = Decimal::ZERO;

    for entry in table {
        if entry.percentage < Decimal::ZERO {
            return Err(Error::InvalidConfiguration(format!(
                "negative percentage {} for '{}'",
                entry.percentage, entry.destination_id
            )));
        }
        if !seen.insert(entry.destination_id.as_str()) {
            return Err(Error::InvalidConfiguration(format!(
                "duplicate destination '{}'",
                entry.destination_id
            )));
        }
        sum += entry.percentage;
    }

    if sum > Decimal::ONE_HUNDRED {
        return Err(Error::InvalidConfiguration(format!(
            "percentages sum to {}, above 100",
            sum
        )));
    }

    Ok(())
}

/// Split `total_usd` by the table, each amount truncated to `decimals`
pub fn compute_plan(
    total_usd: Decimal,
    table: &[AllocationEntry],
    decimals: u32,
) -> Result<DistributionPlan> {
    if total_usd < Decimal::ZERO {
        return Err(Error::InvalidConfiguration(format!(
            "distribution total must not be negative, got {}",
            total_usd
        )));
    }
    validate_allocations(table)?;

    let allocations = table
        .iter()
        .map(|entry| {
            let share = total_usd
                .checked_mul(entry.percentage)
                .map(|v| v / Decimal::ONE_HUNDRED)
                .ok_or_else(|| {
                    Error::InvalidConfiguration(format!(
                        "distribution total {} is out of range for a {}% share",
                        total_usd, entry.percentage
                    ))
                })?;
            Ok(Allocation {
                destination_id: entry.destination_id.clone(),
                percentage: entry.percentage,
                amount_usd: truncate(share, decimals),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let allocated: Decimal = allocations.iter().map(|a| a.amount_usd).sum();
    let claimed: Decimal = table.iter().map(|e| e.percentage).sum();

    Ok(DistributionPlan {
        total_usd,
        allocations,
        unallocated_usd: total_usd - allocated,
        unallocated_pct: Decimal::ONE_HUNDRED - claimed,
    })
}

/// Divide `amount` evenly over `parts`. The rounding remainder goes to the
/// first part.
pub fn split_evenly<S: AsRef<str>>(
    amount: Decimal,
    parts: &[S],
    decimals: u32,
) -> Result<Vec<(String, Decimal)>> {
    if parts.is_empty() {
        return Err(Error::InvalidConfiguration(
            "cannot split over zero parts".into(),
        ));
    }

    let count = Decimal::from(parts.len() as u64);
    let share = truncate(amount / count, decimals);
    let remainder = amount - share * count;

    Ok(parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let value = if i == 0 { share + remainder } else { share };
            (part.as_ref().to_string(), value)
        })
        .collect())
}

fn truncate(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}
