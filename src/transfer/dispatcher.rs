//! Transfer dispatch
//!
//! Converts a USD amount into asset units, submits it through the
//! [`TransferExecutor`], and polls confirmations until the configured
//! minimum or a bounded timeout. Nothing here retries a failed submission.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, warn};

use super::types::{Transfer, TransferRequest};
use crate::error::{Error, Result};
use crate::scheduling::Clock;
use crate::services::{ExchangeRateSource, TransferExecutor};

/// Fiat currency all amounts are denominated in
pub const QUOTE_CURRENCY: &str = "USD";

/// When a submitted transfer counts as settled
#[derive(Debug, Clone)]
pub struct ConfirmationPolicy {
    pub min_confirmations: u32,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            min_confirmations: 3,
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// A USD amount priced in an asset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    /// Asset units per USD
    pub rate: Decimal,
    /// Asset amount, truncated to the asset's precision
    pub amount: Decimal,
}

/// Result of sending one transfer
#[derive(Debug)]
pub enum SendOutcome {
    /// Reached the minimum confirmation count
    Confirmed(Transfer),
    /// Submitted, but confirmation polling failed or timed out. The
    /// transfer is marked `Failed`.
    Unconfirmed(Transfer, Error),
    /// Never reached the executor
    NotSubmitted(Error),
}

impl SendOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SendOutcome::Confirmed(_))
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        match self {
            SendOutcome::Confirmed(t) | SendOutcome::Unconfirmed(t, _) => Some(t),
            SendOutcome::NotSubmitted(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            SendOutcome::Confirmed(_) => None,
            SendOutcome::Unconfirmed(_, e) | SendOutcome::NotSubmitted(e) => Some(e),
        }
    }
}

/// Shared submit-and-confirm path for withdrawals and distribution legs
pub struct TransferDispatcher {
    rates: Arc<dyn ExchangeRateSource>,
    executor: Arc<dyn TransferExecutor>,
    policy: ConfirmationPolicy,
    clock: Arc<dyn Clock>,
}

impl TransferDispatcher {
    pub fn new(
        rates: Arc<dyn ExchangeRateSource>,
        executor: Arc<dyn TransferExecutor>,
        policy: ConfirmationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rates,
            executor,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    /// Price `amount_usd` in `asset`, truncated to `decimals` places so the
    /// transfer never exceeds the USD amount
    pub async fn quote(&self, amount_usd: Decimal, asset: &str, decimals: u32) -> Result<Quote> {
        let rate = self.rates.rate(QUOTE_CURRENCY, asset).await?;
        if rate <= Decimal::ZERO {
            return Err(Error::RateUnavailable {
                from: QUOTE_CURRENCY.to_string(),
                to: asset.to_string(),
                reason: format!("non-positive rate {}", rate),
            });
        }

        let amount = amount_usd
            .checked_mul(rate)
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!("${} in {} is out of range", amount_usd, asset))
            })?
            .round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
        debug!(
            "Quoted ${} as {} {} (1 USD = {} {})",
            amount_usd, amount, asset, rate, asset
        );

        Ok(Quote { rate, amount })
    }

    pub async fn available_balance(&self, asset: &str, network: &str) -> Result<Decimal> {
        self.executor.available_balance(asset, network).await
    }

    /// Submit a transfer; the returned record is `Pending`
    pub async fn submit(&self, request: &TransferRequest, amount: Decimal) -> Result<Transfer> {
        if amount <= Decimal::ZERO {
            return Err(Error::ExecutionError(format!(
                "refusing to submit non-positive amount {} {}",
                amount, request.asset
            )));
        }

        let id = self
            .executor
            .submit(
                &request.asset,
                &request.network,
                &request.destination_address,
                amount,
            )
            .await?;

        info!(
            "Submitted {} {} on {} to {} (id: {})",
            amount, request.asset, request.network, request.destination_address, id
        );

        Ok(Transfer::pending(id, request, amount, self.clock.now()))
    }

    /// Poll confirmations until the policy minimum is reached.
    ///
    /// On success the transfer becomes `Confirmed`; on executor error or
    /// timeout it becomes `Failed` and the error is returned.
    pub async fn await_confirmations(&self, transfer: &mut Transfer) -> Result<()> {
        let required = self.policy.min_confirmations;
        let seen = AtomicU32::new(transfer.confirmations);

        let backoff = ExponentialBackoff {
            initial_interval: self.policy.poll_interval,
            max_interval: self.policy.poll_interval * 4,
            max_elapsed_time: None,
            ..Default::default()
        };

        let polling = retry(backoff, || {
            let executor = Arc::clone(&self.executor);
            let id = transfer.id.clone();
            let seen = &seen;
            async move {
                let count = executor
                    .confirmations(&id)
                    .await
                    .map_err(backoff::Error::permanent)?;
                seen.fetch_max(count, Ordering::Relaxed);

                if count >= required {
                    Ok(count)
                } else {
                    debug!("Transfer {} at {}/{} confirmations", id, count, required);
                    Err(backoff::Error::transient(Error::ConfirmationTimeout {
                        transfer_id: id,
                        confirmations: count,
                        required,
                    }))
                }
            }
        });

        let result = tokio::time::timeout(self.policy.timeout, polling).await;
        transfer.record_confirmations(seen.load(Ordering::Relaxed))?;

        match result {
            Ok(Ok(count)) => {
                transfer.confirm()?;
                info!("Transfer {} confirmed ({} confirmations)", transfer.id, count);
                Ok(())
            }
            Ok(Err(e)) => {
                transfer.fail()?;
                warn!("Confirmation polling for {} failed: {}", transfer.id, e);
                Err(e)
            }
            Err(_) => {
                transfer.fail()?;
                warn!(
                    "Transfer {} not confirmed within {}s",
                    transfer.id,
                    self.policy.timeout.as_secs()
                );
                Err(Error::ConfirmationTimeout {
                    transfer_id: transfer.id.clone(),
                    confirmations: transfer.confirmations,
                    required,
                })
            }
        }
    }

    /// Submit and wait for confirmations
    pub async fn send(&self, request: &TransferRequest, amount: Decimal) -> SendOutcome {
        let mut transfer = match self.submit(request, amount).await {
            Ok(t) => t,
            Err(e) => return SendOutcome::NotSubmitted(e),
        };

        match self.await_confirmations(&mut transfer).await {
            Ok(()) => SendOutcome::Confirmed(transfer),
            Err(e) => SendOutcome::Unconfirmed(transfer, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::TokioClock;
    use crate::services::fakes::{FakeRates, FakeTransferExecutor};
    use crate::transfer::TransferStatus;
    use rust_decimal_macros::dec;

    fn policy() -> ConfirmationPolicy {
        ConfirmationPolicy {
            min_confirmations: 3,
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(10),
        }
    }

    fn dispatcher(executor: Arc<FakeTransferExecutor>) -> TransferDispatcher {
        TransferDispatcher::new(
            Arc::new(FakeRates::default()),
            executor,
            policy(),
            Arc::new(TokioClock::new()),
        )
    }

    #[tokio::test]
    async fn test_quote_truncates_to_precision() {
        let dispatcher = dispatcher(Arc::new(FakeTransferExecutor::new()));

        // 1 BTC = 65000 USD
        let quote = dispatcher.quote(dec!(100000), "BTC", 8).await.unwrap();
        assert_eq!(quote.amount, dec!(1.53846153));
        assert!(quote.amount * dec!(65000) <= dec!(100000));
    }

    #[tokio::test]
    async fn test_quote_out_of_range() {
        let dispatcher = TransferDispatcher::new(
            Arc::new(FakeRates::default().with_price("DUST", dec!(0.001))),
            Arc::new(FakeTransferExecutor::new()),
            policy(),
            Arc::new(TokioClock::new()),
        );

        let err = dispatcher.quote(Decimal::MAX / dec!(10), "DUST", 8).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_quote_rate_failure() {
        let rates = FakeRates::default();
        rates.set_failing(true);
        let dispatcher = TransferDispatcher::new(
            Arc::new(rates),
            Arc::new(FakeTransferExecutor::new()),
            policy(),
            Arc::new(TokioClock::new()),
        );

        let err = dispatcher.quote(dec!(10), "BTC", 8).await.unwrap_err();
        assert!(matches!(err, Error::RateUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_confirms() {
        let executor = Arc::new(FakeTransferExecutor::new());
        let dispatcher = dispatcher(executor.clone());
        let request = TransferRequest::new("BTC", "bitcoin", "bc1qdest");

        let outcome = dispatcher.send(&request, dec!(0.5)).await;

        let transfer = outcome.transfer().unwrap();
        assert!(outcome.is_confirmed());
        assert_eq!(transfer.status, TransferStatus::Confirmed);
        assert!(transfer.confirmations >= 3);
        assert_eq!(executor.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_as_failed() {
        let executor = Arc::new(FakeTransferExecutor::new());
        executor.set_confirmation_cap(1);
        let dispatcher = dispatcher(executor);
        let request = TransferRequest::new("BTC", "bitcoin", "bc1qdest");

        let outcome = dispatcher.send(&request, dec!(0.5)).await;

        match outcome {
            SendOutcome::Unconfirmed(transfer, Error::ConfirmationTimeout { confirmations, required, .. }) => {
                assert_eq!(transfer.status, TransferStatus::Failed);
                assert_eq!(transfer.confirmations, 1);
                assert_eq!(confirmations, 1);
                assert_eq!(required, 3);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_rejected_submission() {
        let executor = Arc::new(FakeTransferExecutor::new());
        executor.fail_network("bitcoin");
        let dispatcher = dispatcher(executor);
        let request = TransferRequest::new("BTC", "bitcoin", "bc1qdest");

        let outcome = dispatcher.send(&request, dec!(0.5)).await;

        assert!(outcome.transfer().is_none());
        assert!(matches!(outcome.error(), Some(Error::ExecutionError(_))));
    }

    #[tokio::test]
    async fn test_zero_amount_not_submitted() {
        let executor = Arc::new(FakeTransferExecutor::new());
        let dispatcher = dispatcher(executor.clone());
        let request = TransferRequest::new("BTC", "bitcoin", "bc1qdest");

        let result = dispatcher.submit(&request, Decimal::ZERO).await;

        assert!(result.is_err());
        assert!(executor.submitted().is_empty());
    }
}
