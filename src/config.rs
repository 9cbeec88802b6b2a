//! Configuration loading and validation

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::distribution::plan::{validate_allocations, AllocationEntry};
use crate::error::{Error, Result};
use crate::transfer::ConfirmationPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub withdrawal: WithdrawalConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub stablecoin: StablecoinConfig,
    #[serde(default)]
    pub confirmations: ConfirmationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Threshold-triggered withdrawal monitor
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Profit ceiling that triggers the withdrawal
    #[serde(default = "default_threshold_usd")]
    pub threshold_usd: Decimal,

    /// Window length; the window expires when this elapses first
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    #[serde(default = "default_withdrawal_poll_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_btc_asset")]
    pub asset: String,

    #[serde(default = "default_bitcoin_network")]
    pub network: String,

    #[serde(default = "default_btc_address")]
    pub address: String,

    /// Precision the asset amount is truncated to
    #[serde(default = "default_asset_decimals")]
    pub asset_decimals: u32,
}

impl WithdrawalConfig {
    pub fn deadline(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.deadline_secs as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_usd: default_threshold_usd(),
            deadline_secs: default_deadline_secs(),
            poll_interval_secs: default_withdrawal_poll_secs(),
            asset: default_btc_asset(),
            network: default_bitcoin_network(),
            address: default_btc_address(),
            asset_decimals: default_asset_decimals(),
        }
    }
}

/// What happens to the share of profit no destination claims
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Reported as the operational bucket on every plan
    #[default]
    Operational,
    /// Tables must sum to exactly 100
    Reject,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// External transfer, fanned out over `networks`
    #[default]
    Wallet,
    /// Internal bucket split over `strategies`; nothing leaves custody
    Reinvestment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    pub id: String,

    #[serde(default)]
    pub kind: DestinationKind,

    pub percentage: Decimal,

    #[serde(default)]
    pub asset: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub networks: Vec<String>,

    #[serde(default = "default_asset_decimals")]
    pub asset_decimals: u32,

    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl DestinationConfig {
    fn wallet(id: &str, percentage: Decimal, asset: &str, address: String, networks: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            kind: DestinationKind::Wallet,
            percentage,
            asset: asset.to_string(),
            address,
            networks: networks.iter().map(|n| n.to_string()).collect(),
            asset_decimals: default_asset_decimals(),
            strategies: vec![],
        }
    }

    pub fn is_reinvestment(&self) -> bool {
        self.kind == DestinationKind::Reinvestment
    }
}

/// Periodic profit distribution
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_distribution_period_secs")]
    pub period_secs: u64,

    /// Fire on UTC multiples of the period instead of relative to start
    #[serde(default = "default_true")]
    pub align_to_period: bool,

    /// USD precision of plan amounts
    #[serde(default = "default_amount_decimals")]
    pub amount_decimals: u32,

    #[serde(default)]
    pub remainder_policy: RemainderPolicy,

    #[serde(default = "default_destinations")]
    pub destinations: Vec<DestinationConfig>,
}

impl DistributionConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// Destination percentages in plan order
    pub fn allocation_table(&self) -> Vec<AllocationEntry> {
        self.destinations
            .iter()
            .map(|d| AllocationEntry::new(d.id.clone(), d.percentage))
            .collect()
    }

    pub fn destination(&self, id: &str) -> Option<&DestinationConfig> {
        self.destinations.iter().find(|d| d.id == id)
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: default_distribution_period_secs(),
            align_to_period: true,
            amount_decimals: default_amount_decimals(),
            remainder_policy: RemainderPolicy::default(),
            destinations: default_destinations(),
        }
    }
}

/// Capped stablecoin sweep
#[derive(Debug, Clone, Deserialize)]
pub struct StablecoinConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_stablecoin_period_secs")]
    pub period_secs: u64,

    #[serde(default = "default_true")]
    pub align_to_period: bool,

    /// Most that leaves per tick
    #[serde(default = "default_ceiling_usd")]
    pub ceiling_usd: Decimal,

    #[serde(default = "default_usdc_asset")]
    pub asset: String,

    #[serde(default = "default_ethereum_network")]
    pub network: String,

    #[serde(default = "default_usdc_address")]
    pub address: String,

    #[serde(default = "default_stablecoin_decimals")]
    pub asset_decimals: u32,
}

impl StablecoinConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl Default for StablecoinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: default_stablecoin_period_secs(),
            align_to_period: true,
            ceiling_usd: default_ceiling_usd(),
            asset: default_usdc_asset(),
            network: default_ethereum_network(),
            address: default_usdc_address(),
            asset_decimals: default_stablecoin_decimals(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u32,

    #[serde(default = "default_confirmation_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_confirmation_poll_secs")]
    pub poll_interval_secs: u64,
}

impl ConfirmationConfig {
    pub fn policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            min_confirmations: self.min_confirmations,
            timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            min_confirmations: default_min_confirmations(),
            timeout_secs: default_confirmation_timeout_secs(),
            poll_interval_secs: default_confirmation_poll_secs(),
        }
    }
}

/// Telegram delivery; without both values notifications go to the log
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_telegram_token")]
    pub telegram_bot_token: Option<String>,

    #[serde(default = "default_telegram_chat_id")]
    pub telegram_chat_id: Option<String>,
}

impl NotificationConfig {
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.as_str(), chat.as_str()))
            }
            _ => None,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: default_telegram_token(),
            telegram_chat_id: default_telegram_chat_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Parameters of the simulated collaborators used by the binary
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_starting_profit")]
    pub starting_profit_usd: f64,

    #[serde(default = "default_doubling_hours")]
    pub profit_doubling_hours: f64,

    #[serde(default = "default_usd_prices")]
    pub usd_prices: HashMap<String, Decimal>,

    /// Random price movement per quote, in percent
    #[serde(default = "default_price_jitter_pct")]
    pub price_jitter_pct: f64,

    /// Custody balances in asset units
    #[serde(default = "default_balances")]
    pub balances: HashMap<String, Decimal>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            starting_profit_usd: default_starting_profit(),
            profit_doubling_hours: default_doubling_hours(),
            usd_prices: default_usd_prices(),
            price_jitter_pct: default_price_jitter_pct(),
            balances: default_balances(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_threshold_usd() -> Decimal {
    dec!(100000)
}

fn default_deadline_secs() -> u64 {
    3 * 3600
}

fn default_withdrawal_poll_secs() -> u64 {
    300
}

fn default_btc_asset() -> String {
    "BTC".to_string()
}

fn default_bitcoin_network() -> String {
    "bitcoin".to_string()
}

fn default_btc_address() -> String {
    env_or("BTC_WALLET_ADDRESS", "bc1qxcfdzz3xhc4fkjwdtmdx94glxjx0zk2m53xmth")
}

fn default_eth_address() -> String {
    env_or("ETH_WALLET_ADDRESS", "0x9146A9A5EFb565BF150607170CAc7C8A1b210F69")
}

fn default_usdc_address() -> String {
    env_or("USDC_WALLET_ADDRESS", "0x57E0b47bA8308F1A40f95bB4D3aA867cd1C08760")
}

fn default_asset_decimals() -> u32 {
    8
}

fn default_distribution_period_secs() -> u64 {
    6 * 3600
}

fn default_amount_decimals() -> u32 {
    2
}

fn default_destinations() -> Vec<DestinationConfig> {
    vec![
        DestinationConfig::wallet("btc", dec!(70), "BTC", default_btc_address(), &["bitcoin"]),
        DestinationConfig::wallet(
            "eth",
            dec!(20),
            "ETH",
            default_eth_address(),
            &[
                "ethereum",
                "linea",
                "arbitrum",
                "avalanche",
                "base",
                "bsc",
                "optimism",
                "polygon",
                "zksync",
            ],
        ),
        DestinationConfig {
            id: "reinvest".to_string(),
            kind: DestinationKind::Reinvestment,
            percentage: dec!(10),
            asset: String::new(),
            address: String::new(),
            networks: vec![],
            asset_decimals: default_asset_decimals(),
            strategies: [
                ("yield_farming", dec!(40)),
                ("staking", dec!(30)),
                ("flash_loans", dec!(15)),
                ("arbitrage", dec!(15)),
            ]
            .into_iter()
            .map(|(name, percentage)| StrategyConfig {
                name: name.to_string(),
                percentage,
            })
            .collect(),
        },
    ]
}

fn default_stablecoin_period_secs() -> u64 {
    3600
}

fn default_ceiling_usd() -> Decimal {
    dec!(100000)
}

fn default_usdc_asset() -> String {
    "USDC".to_string()
}

fn default_ethereum_network() -> String {
    "ethereum".to_string()
}

fn default_stablecoin_decimals() -> u32 {
    6
}

fn default_min_confirmations() -> u32 {
    3
}

fn default_confirmation_timeout_secs() -> u64 {
    3600
}

fn default_confirmation_poll_secs() -> u64 {
    30
}

fn default_telegram_token() -> Option<String> {
    std::env::var("TELEGRAM_BOT_TOKEN").ok()
}

fn default_telegram_chat_id() -> Option<String> {
    std::env::var("TELEGRAM_CHAT_ID").ok()
}

fn default_ledger_path() -> String {
    "ledger.jsonl".to_string()
}

fn default_starting_profit() -> f64 {
    10_000.0
}

fn default_doubling_hours() -> f64 {
    1.0
}

fn default_usd_prices() -> HashMap<String, Decimal> {
    [("BTC", dec!(65000)), ("ETH", dec!(3500)), ("USDC", dec!(1))]
        .into_iter()
        .map(|(asset, price)| (asset.to_string(), price))
        .collect()
}

fn default_price_jitter_pct() -> f64 {
    1.5
}

fn default_balances() -> HashMap<String, Decimal> {
    [("BTC", dec!(5)), ("ETH", dec!(100)), ("USDC", dec!(250000))]
        .into_iter()
        .map(|(asset, balance)| (asset.to_string(), balance))
        .collect()
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

const BTC_ADDRESS_PATTERN: &str = r"^(bc1[a-z0-9]{25,87}|[13][a-km-zA-HJ-NP-Z1-9]{25,34})$";
const EVM_ADDRESS_PATTERN: &str = r"^0x[0-9a-fA-F]{40}$";

/// Checks destination addresses against the format of their network
struct AddressRules {
    btc: Regex,
    evm: Regex,
}

impl AddressRules {
    fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Internal(format!("address pattern: {}", e)))
        };
        Ok(Self {
            btc: compile(BTC_ADDRESS_PATTERN)?,
            evm: compile(EVM_ADDRESS_PATTERN)?,
        })
    }

    fn check(&self, owner: &str, network: &str, address: &str) -> Result<()> {
        let (rule, kind) = if network == "bitcoin" {
            (&self.btc, "bitcoin")
        } else {
            (&self.evm, "EVM")
        };

        if !rule.is_match(address) {
            return Err(Error::InvalidConfiguration(format!(
                "{}: '{}' is not a valid {} address",
                owner, address, kind
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix ROUTER__)
            .add_source(
                config::Environment::with_prefix("ROUTER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfiguration(msg));
        let addresses = AddressRules::new()?;

        // Withdrawal window
        let w = &self.withdrawal;
        if w.threshold_usd <= Decimal::ZERO {
            return invalid("withdrawal.threshold_usd must be positive".into());
        }
        if w.deadline_secs == 0 {
            return invalid("withdrawal.deadline_secs must be positive".into());
        }
        if w.poll_interval_secs == 0 {
            return invalid("withdrawal.poll_interval_secs must be positive".into());
        }
        addresses.check("withdrawal.address", &w.network, &w.address)?;

        // Distribution table
        let d = &self.distribution;
        if d.period_secs == 0 {
            return invalid("distribution.period_secs must be positive".into());
        }
        if d.destinations.is_empty() {
            return invalid("distribution.destinations is empty".into());
        }
        validate_allocations(&d.allocation_table())?;
        if d.remainder_policy == RemainderPolicy::Reject {
            let sum: Decimal = d.destinations.iter().map(|x| x.percentage).sum();
            if sum != dec!(100) {
                return invalid(format!(
                    "distribution percentages sum to {} but remainder_policy is 'reject'",
                    sum
                ));
            }
        }

        for dest in &d.destinations {
            let owner = format!("distribution.destinations[{}]", dest.id);
            match dest.kind {
                DestinationKind::Wallet => {
                    if dest.asset.is_empty() {
                        return invalid(format!("{}: asset is required", owner));
                    }
                    if dest.networks.is_empty() {
                        return invalid(format!("{}: at least one network is required", owner));
                    }
                    for network in &dest.networks {
                        addresses.check(&owner, network, &dest.address)?;
                    }
                }
                DestinationKind::Reinvestment => {
                    let table: Vec<AllocationEntry> = dest
                        .strategies
                        .iter()
                        .map(|s| AllocationEntry::new(s.name.clone(), s.percentage))
                        .collect();
                    validate_allocations(&table)
                        .map_err(|e| Error::InvalidConfiguration(format!("{}: {}", owner, e)))?;
                }
            }
        }

        // Stablecoin sweep
        let s = &self.stablecoin;
        if s.period_secs == 0 {
            return invalid("stablecoin.period_secs must be positive".into());
        }
        if s.ceiling_usd <= Decimal::ZERO {
            return invalid("stablecoin.ceiling_usd must be positive".into());
        }
        addresses.check("stablecoin.address", &s.network, &s.address)?;

        // Confirmations
        let c = &self.confirmations;
        if c.min_confirmations == 0 {
            return invalid("confirmations.min_confirmations must be at least 1".into());
        }
        if c.timeout_secs == 0 || c.poll_interval_secs == 0 {
            return invalid("confirmations timeout and poll interval must be positive".into());
        }

        if self.simulation.profit_doubling_hours <= 0.0 {
            return invalid("simulation.profit_doubling_hours must be positive".into());
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let destinations = self
            .distribution
            .destinations
            .iter()
            .map(|d| match d.kind {
                DestinationKind::Wallet => format!(
                    "    {}: {}% {} -> {} ({} networks)",
                    d.id,
                    d.percentage,
                    d.asset,
                    mask_address(&d.address),
                    d.networks.len()
                ),
                DestinationKind::Reinvestment => format!(
                    "    {}: {}% reinvested over {} strategies",
                    d.id,
                    d.percentage,
                    d.strategies.len()
                ),
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Configuration:
  Withdrawal:
    enabled: {}
    threshold: ${}
    deadline: {}s
    poll_interval: {}s
    destination: {} on {} -> {}
  Distribution:
    enabled: {}
    period: {}s (aligned: {})
    remainder_policy: {:?}
{}
  Stablecoin:
    enabled: {}
    period: {}s
    ceiling: ${}
    destination: {} on {} -> {}
  Confirmations:
    min: {}
    timeout: {}s
  Notifications:
    telegram_bot_token: {}
    telegram_chat_id: {}
  Ledger:
    path: {}
"#,
            self.withdrawal.enabled,
            self.withdrawal.threshold_usd,
            self.withdrawal.deadline_secs,
            self.withdrawal.poll_interval_secs,
            self.withdrawal.asset,
            self.withdrawal.network,
            mask_address(&self.withdrawal.address),
            self.distribution.enabled,
            self.distribution.period_secs,
            self.distribution.align_to_period,
            self.distribution.remainder_policy,
            destinations,
            self.stablecoin.enabled,
            self.stablecoin.period_secs,
            self.stablecoin.ceiling_usd,
            self.stablecoin.asset,
            self.stablecoin.network,
            mask_address(&self.stablecoin.address),
            self.confirmations.min_confirmations,
            self.confirmations.timeout_secs,
            match &self.notifications.telegram_bot_token {
                Some(t) if !t.is_empty() => "***",
                _ => "(not set)",
            },
            self.notifications
                .telegram_chat_id
                .as_deref()
                .unwrap_or("(not set)"),
            self.ledger.path,
        )
    }
}

/// Shorten an address for display
pub fn mask_address(address: &str) -> String {
    if address.len() <= 12 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}
