//! Simulated collaborators
//!
//! Stand-ins used by the binary until real profit, pricing and custody
//! integrations are wired in. They behave like the demo backend: profit
//! doubles every hour, prices wobble a little, and every confirmation query
//! observes one more block.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{ExchangeRateSource, ProfitSource, TransferExecutor};
use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::scheduling::Clock;
use crate::transfer::QUOTE_CURRENCY;

/// Asset tables keyed by upper-case symbol; config sources lowercase keys
fn by_symbol(table: &HashMap<String, Decimal>) -> HashMap<String, Decimal> {
    table
        .iter()
        .map(|(asset, value)| (asset.to_uppercase(), *value))
        .collect()
}

/// Profit growing exponentially from a starting amount
pub struct SimulatedProfitSource {
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    starting_usd: f64,
    doubling_hours: f64,
}

impl SimulatedProfitSource {
    pub fn new(config: &SimulationConfig, clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            started_at,
            starting_usd: config.starting_profit_usd,
            doubling_hours: config.profit_doubling_hours,
        }
    }

    fn profit_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_hours = (now - self.started_at).num_milliseconds() as f64 / 3_600_000.0;
        self.starting_usd * 2f64.powf(elapsed_hours / self.doubling_hours)
    }
}

#[async_trait]
impl ProfitSource for SimulatedProfitSource {
    async fn accumulated_profit_usd(&self) -> Result<Decimal> {
        let profit = self.profit_at(self.clock.now());
        let profit = Decimal::try_from(profit)
            .map_err(|e| Error::SourceUnavailable(format!("profit out of range: {}", e)))?;
        Ok(profit.round_dp(2))
    }
}

/// USD price table with random jitter on every quote
pub struct SimulatedRates {
    usd_prices: HashMap<String, Decimal>,
    jitter_pct: f64,
}

impl SimulatedRates {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            usd_prices: by_symbol(&config.usd_prices),
            jitter_pct: config.price_jitter_pct,
        }
    }

    fn usd_price(&self, asset: &str) -> Option<Decimal> {
        let base = *self.usd_prices.get(&asset.to_uppercase())?;
        if self.jitter_pct <= 0.0 {
            return Some(base);
        }

        let jitter = rand::thread_rng().gen_range(-self.jitter_pct..=self.jitter_pct) / 100.0;
        let factor = Decimal::try_from(1.0 + jitter).unwrap_or(Decimal::ONE);
        Some((base * factor).round_dp(2))
    }
}

#[async_trait]
impl ExchangeRateSource for SimulatedRates {
    async fn rate(&self, from: &str, to: &str) -> Result<Decimal> {
        let unavailable = |reason: String| Error::RateUnavailable {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };

        let price_of = |asset: &str| -> Result<Decimal> {
            if asset == QUOTE_CURRENCY {
                return Ok(Decimal::ONE);
            }
            match self.usd_price(asset) {
                Some(p) if p > Decimal::ZERO => Ok(p),
                _ => Err(unavailable(format!("no price for {}", asset))),
            }
        };

        let rate = price_of(from)? / price_of(to)?;
        debug!("Simulated rate: 1 {} = {} {}", from, rate, to);
        Ok(rate)
    }
}

/// Custodial executor holding per-asset balances
pub struct SimulatedTransferExecutor {
    balances: Mutex<HashMap<String, Decimal>>,
    confirmations: Mutex<HashMap<String, u32>>,
}

impl SimulatedTransferExecutor {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            balances: Mutex::new(by_symbol(&config.balances)),
            confirmations: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TransferExecutor for SimulatedTransferExecutor {
    async fn available_balance(&self, asset: &str, _network: &str) -> Result<Decimal> {
        Ok(self
            .balances
            .lock()
            .get(&asset.to_uppercase())
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn submit(
        &self,
        asset: &str,
        network: &str,
        destination_address: &str,
        amount: Decimal,
    ) -> Result<String> {
        {
            let mut balances = self.balances.lock();
            let balance = balances.entry(asset.to_uppercase()).or_insert(Decimal::ZERO);
            if *balance < amount {
                return Err(Error::ExecutionError(format!(
                    "custody balance {} {} below {}",
                    balance, asset, amount
                )));
            }
            *balance -= amount;
        }

        let id = format!(
            "tx_{}_{}",
            Utc::now().timestamp_millis(),
            rand::thread_rng().gen_range(0..1_000_000)
        );
        self.confirmations.lock().insert(id.clone(), 0);

        info!(
            "Simulating send of {} {} on {} to {} (id: {})",
            amount, asset, network, destination_address, id
        );
        Ok(id)
    }

    async fn confirmations(&self, transfer_id: &str) -> Result<u32> {
        let mut confirmations = self.confirmations.lock();
        let count = confirmations
            .get_mut(transfer_id)
            .ok_or_else(|| Error::ExecutionError(format!("unknown transfer {}", transfer_id)))?;
        *count += 1;
        Ok(*count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::ManualClock;
    use rust_decimal_macros::dec;

    fn config() -> SimulationConfig {
        SimulationConfig {
            price_jitter_pct: 0.0,
            ..SimulationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_profit_doubles_each_period() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let source = SimulatedProfitSource::new(&config(), clock.clone());

        assert_eq!(source.accumulated_profit_usd().await.unwrap(), dec!(10000));

        clock.advance(chrono::Duration::hours(2));
        assert_eq!(source.accumulated_profit_usd().await.unwrap(), dec!(40000));
    }

    #[tokio::test]
    async fn test_rates_both_directions() {
        let rates = SimulatedRates::new(&config());

        let usd_per_btc = rates.rate("BTC", "USD").await.unwrap();
        assert_eq!(usd_per_btc, dec!(65000));

        let btc_per_usd = rates.rate("USD", "BTC").await.unwrap();
        assert!((btc_per_usd * dec!(65000) - Decimal::ONE).abs() < dec!(0.0000001));

        assert!(rates.rate("USD", "DOGE").await.is_err());
    }

    #[tokio::test]
    async fn test_executor_debits_balance() {
        let executor = SimulatedTransferExecutor::new(&config());
        let before = executor.available_balance("BTC", "bitcoin").await.unwrap();

        let id = executor
            .submit("BTC", "bitcoin", "bc1qdest", dec!(0.25))
            .await
            .unwrap();

        let after = executor.available_balance("BTC", "bitcoin").await.unwrap();
        assert_eq!(before - after, dec!(0.25));
        assert_eq!(executor.confirmations(&id).await.unwrap(), 1);
        assert_eq!(executor.confirmations(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_executor_rejects_overdraft() {
        let executor = SimulatedTransferExecutor::new(&config());
        let result = executor
            .submit("BTC", "bitcoin", "bc1qdest", dec!(1000000))
            .await;
        assert!(matches!(result, Err(Error::ExecutionError(_))));
    }
}
