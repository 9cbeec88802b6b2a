//! In-memory collaborator fakes for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{ExchangeRateSource, NotificationSink, ProfitSource, TransferExecutor};
use crate::error::{Error, Result};

/// Profit source returning a settable value
#[derive(Default)]
pub struct FakeProfitSource {
    profit: Mutex<Decimal>,
    failing: Mutex<bool>,
    reads: AtomicU64,
}

impl FakeProfitSource {
    pub fn new(profit: Decimal) -> Self {
        Self {
            profit: Mutex::new(profit),
            ..Default::default()
        }
    }

    pub fn set(&self, profit: Decimal) {
        *self.profit.lock() = profit;
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfitSource for FakeProfitSource {
    async fn accumulated_profit_usd(&self) -> Result<Decimal> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock() {
            return Err(Error::SourceUnavailable("fake outage".into()));
        }
        Ok(*self.profit.lock())
    }
}

/// USD price table: BTC 65000, ETH 2500, USDC 1
pub struct FakeRates {
    usd_prices: HashMap<String, Decimal>,
    failing: Mutex<bool>,
}

impl Default for FakeRates {
    fn default() -> Self {
        let usd_prices = [("BTC", dec!(65000)), ("ETH", dec!(2500)), ("USDC", dec!(1))]
            .into_iter()
            .map(|(a, p)| (a.to_string(), p))
            .collect();
        Self {
            usd_prices,
            failing: Mutex::new(false),
        }
    }
}

impl FakeRates {
    pub fn with_price(mut self, asset: &str, usd_price: Decimal) -> Self {
        self.usd_prices.insert(asset.to_string(), usd_price);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl ExchangeRateSource for FakeRates {
    async fn rate(&self, from: &str, to: &str) -> Result<Decimal> {
        let unavailable = |reason: &str| Error::RateUnavailable {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        };

        if *self.failing.lock() {
            return Err(unavailable("fake outage"));
        }
        if from != "USD" {
            return Err(unavailable("only USD quotes supported"));
        }

        let price = self.usd_prices.get(to).ok_or_else(|| unavailable("unknown asset"))?;
        Ok(Decimal::ONE / price)
    }
}

/// A submission seen by [`FakeTransferExecutor`]
#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub id: String,
    pub asset: String,
    pub network: String,
    pub destination_address: String,
    pub amount: Decimal,
}

/// Executor with scriptable failures.
///
/// Each `confirmations()` query adds one confirmation, up to an optional cap.
pub struct FakeTransferExecutor {
    balances: Mutex<HashMap<String, Decimal>>,
    failing_networks: Mutex<HashSet<String>>,
    failing_assets: Mutex<HashSet<String>>,
    confirmation_cap: Mutex<Option<u32>>,
    submit_delay: Mutex<Duration>,
    confirmations: Mutex<HashMap<String, u32>>,
    submitted: Mutex<Vec<Submitted>>,
    next_id: AtomicU32,
}

impl FakeTransferExecutor {
    pub fn new() -> Self {
        let balances = [("BTC", dec!(10)), ("ETH", dec!(1000)), ("USDC", dec!(500000))]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b))
            .collect();
        Self {
            balances: Mutex::new(balances),
            failing_networks: Mutex::new(HashSet::new()),
            failing_assets: Mutex::new(HashSet::new()),
            confirmation_cap: Mutex::new(None),
            submit_delay: Mutex::new(Duration::ZERO),
            confirmations: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn set_balance(&self, asset: &str, balance: Decimal) {
        self.balances.lock().insert(asset.to_string(), balance);
    }

    pub fn fail_network(&self, network: &str) {
        self.failing_networks.lock().insert(network.to_string());
    }

    pub fn fail_asset(&self, asset: &str) {
        self.failing_assets.lock().insert(asset.to_string());
    }

    pub fn set_confirmation_cap(&self, cap: u32) {
        *self.confirmation_cap.lock() = Some(cap);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock() = delay;
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl TransferExecutor for FakeTransferExecutor {
    async fn available_balance(&self, asset: &str, _network: &str) -> Result<Decimal> {
        Ok(self
            .balances
            .lock()
            .get(asset)
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
        let delay = *self.submit_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing_networks.lock().contains(network) || self.failing_assets.lock().contains(asset)
        {
            return Err(Error::ExecutionError(format!(
                "fake rejection of {} on {}",
                asset, network
            )));
        }

        let id = format!("tx_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.confirmations.lock().insert(id.clone(), 0);
        self.submitted.lock().push(Submitted {
            id: id.clone(),
            asset: asset.to_string(),
            network: network.to_string(),
            destination_address: destination_address.to_string(),
            amount,
        });
        Ok(id)
    }

    async fn confirmations(&self, transfer_id: &str) -> Result<u32> {
        let cap = *self.confirmation_cap.lock();
        let mut confirmations = self.confirmations.lock();
        let count = confirmations
            .get_mut(transfer_id)
            .ok_or_else(|| Error::ExecutionError(format!("unknown transfer {}", transfer_id)))?;

        *count = match cap {
            Some(cap) => (*count + 1).min(cap),
            None => *count + 1,
        };
        Ok(*count)
    }
}

/// Notification sink that keeps every message
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        if *self.failing.lock() {
            return Err(Error::Notification("fake outage".into()));
        }
        self.messages
            .lock()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}
