//! External collaborators
//!
//! The core never talks to a chain, an exchange or a database directly. It
//! calls the capability traits below, which are injected at construction:
//!
//! ```text
//! ProfitSource ─┐
//! ExchangeRateSource ─┼─▶ WithdrawalMonitor / DistributionScheduler ─▶ NotificationSink
//! TransferExecutor ─┘                                             └──▶ Ledger
//! ```
//!
//! Notification and ledger failures are best-effort: they are logged and
//! never propagated into the run that produced them.

pub mod ledger;
pub mod notify;
pub mod simulated;

#[cfg(test)]
pub(crate) mod fakes;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::Result;

pub use ledger::{JsonlLedger, LedgerEntry, MemoryLedger};
pub use notify::{LogNotifier, TelegramNotifier};
pub use simulated::{SimulatedProfitSource, SimulatedRates, SimulatedTransferExecutor};

/// Reports accumulated, undistributed profit
#[async_trait]
pub trait ProfitSource: Send + Sync {
    /// Current accumulated profit in USD. Fails with `SourceUnavailable`.
    async fn accumulated_profit_usd(&self) -> Result<Decimal>;
}

/// Market conversion rates
#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    /// Units of `to` bought by one unit of `from` (e.g. USD→BTC ≈ 0.000015).
    /// Fails with `RateUnavailable`.
    async fn rate(&self, from: &str, to: &str) -> Result<Decimal>;
}

/// Submits asset transfers and tracks their confirmations
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Spendable balance of `asset` on `network`, in asset units
    async fn available_balance(&self, asset: &str, network: &str) -> Result<Decimal>;

    /// Submit a transfer; returns the executor-assigned transfer id.
    /// Fails with `ExecutionError`.
    async fn submit(
        &self,
        asset: &str,
        network: &str,
        destination_address: &str,
        amount: Decimal,
    ) -> Result<String>;

    /// Current confirmation count of a submitted transfer
    async fn confirmations(&self, transfer_id: &str) -> Result<u32>;
}

/// Delivers human-readable alerts
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Persists run outcomes for audit
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record(&self, entry: &LedgerEntry) -> Result<()>;
}

/// Send a notification, logging (never propagating) failures
pub async fn notify_best_effort(sink: &dyn NotificationSink, title: &str, body: &str) {
    if let Err(e) = sink.notify(title, body).await {
        warn!("Notification '{}' not delivered: {}", title, e);
    }
}

/// Record a ledger entry, logging (never propagating) failures
pub async fn record_best_effort(ledger: &dyn Ledger, entry: &LedgerEntry) {
    if let Err(e) = ledger.record(entry).await {
        warn!("Ledger entry {} not recorded: {}", entry.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::withdrawal::{WithdrawalKind, WithdrawalOutcome, WithdrawalRecord};
    use chrono::Utc;
    use super::fakes::RecordingNotifier;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct BrokenLedger;

    #[async_trait]
    impl Ledger for BrokenLedger {
        async fn record(&self, _entry: &LedgerEntry) -> Result<()> {
            Err(Error::Ledger("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_notify_failure_is_swallowed() {
        let notifier = RecordingNotifier::default();
        notifier.set_failing(true);

        notify_best_effort(&notifier, "BTC withdrawal completed", "body").await;
        assert!(notifier.messages().is_empty());

        notifier.set_failing(false);
        notify_best_effort(&notifier, "BTC withdrawal completed", "body").await;
        assert_eq!(notifier.titles(), vec!["BTC withdrawal completed".to_string()]);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_swallowed() {
        let entry = LedgerEntry::Withdrawal(WithdrawalRecord {
            id: Uuid::new_v4(),
            kind: WithdrawalKind::Forced,
            window_id: None,
            triggered_at: Utc::now(),
            amount_usd: dec!(500),
            asset: "BTC".to_string(),
            rate: None,
            amount_asset: None,
            transfer: None,
            outcome: WithdrawalOutcome::Failed,
            error: Some("rate unavailable".to_string()),
        });

        record_best_effort(&BrokenLedger, &entry).await;

        let ledger = MemoryLedger::new();
        record_best_effort(&ledger, &entry).await;
        assert_eq!(ledger.len().await, 1);
    }
}
