//! Component wiring
//!
//! Builds the withdrawal monitor and the distribution scheduler from a
//! [`Config`] and a set of collaborators. The binary uses the simulated
//! collaborators; tests pass fakes through [`Services`].

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::distribution::{DistributionRun, DistributionScheduler, DistributionStats, StablecoinStats};
use crate::error::Result;
use crate::scheduling::{Clock, TokioClock};
use crate::services::{
    ExchangeRateSource, JsonlLedger, Ledger, LogNotifier, NotificationSink, ProfitSource,
    SimulatedProfitSource, SimulatedRates, SimulatedTransferExecutor, TelegramNotifier,
    TransferExecutor,
};
use crate::transfer::{TransferDispatcher, TransferRequest};
use crate::withdrawal::{MonitorStatus, WithdrawalMonitor, WithdrawalPipeline};

/// Collaborators injected into the core components
pub struct Services {
    pub profit: Arc<dyn ProfitSource>,
    pub rates: Arc<dyn ExchangeRateSource>,
    pub executor: Arc<dyn TransferExecutor>,
    pub notifier: Arc<dyn NotificationSink>,
    pub ledger: Arc<dyn Ledger>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Simulated profit, prices and custody; Telegram or log notifications;
    /// JSON-lines ledger
    pub fn simulated(config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        let notifier: Arc<dyn NotificationSink> = match config.notifications.telegram() {
            Some((token, chat_id)) => {
                info!("Notifications delivered to Telegram chat {}", chat_id);
                Arc::new(TelegramNotifier::new(token, chat_id))
            }
            None => {
                info!("Telegram not configured, notifications go to the log");
                Arc::new(LogNotifier)
            }
        };

        Self {
            profit: Arc::new(SimulatedProfitSource::new(&config.simulation, clock.clone())),
            rates: Arc::new(SimulatedRates::new(&config.simulation)),
            executor: Arc::new(SimulatedTransferExecutor::new(&config.simulation)),
            notifier,
            ledger: Arc::new(JsonlLedger::new(&config.ledger.path)),
            clock,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    pub withdrawal: MonitorStatus,
    pub distribution: DistributionStats,
    pub stablecoin: StablecoinStats,
    pub last_distribution: Option<DistributionRun>,
}

pub struct App {
    config: Config,
    monitor: Arc<WithdrawalMonitor>,
    scheduler: Arc<DistributionScheduler>,
}

impl App {
    pub fn new(config: Config, services: Services) -> Self {
        let dispatcher = Arc::new(TransferDispatcher::new(
            services.rates,
            services.executor,
            config.confirmations.policy(),
            services.clock.clone(),
        ));

        let w = &config.withdrawal;
        let pipeline = WithdrawalPipeline::new(
            dispatcher.clone(),
            TransferRequest::new(&w.asset, &w.network, &w.address),
            w.asset_decimals,
            services.clock.clone(),
        );

        let monitor = Arc::new(WithdrawalMonitor::new(
            w.clone(),
            services.profit.clone(),
            pipeline,
            services.notifier.clone(),
            services.ledger.clone(),
            services.clock.clone(),
        ));

        let scheduler = Arc::new(DistributionScheduler::new(
            config.distribution.clone(),
            config.stablecoin.clone(),
            services.profit,
            dispatcher,
            services.notifier,
            services.ledger,
            services.clock,
        ));

        Self {
            config,
            monitor,
            scheduler,
        }
    }

    /// Wire against the simulated collaborators
    pub fn simulated(config: Config) -> Self {
        let services = Services::simulated(&config);
        Self::new(config, services)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<WithdrawalMonitor> {
        &self.monitor
    }

    pub fn scheduler(&self) -> &Arc<DistributionScheduler> {
        &self.scheduler
    }

    /// Start the enabled background tasks
    pub fn start(&self) -> Result<()> {
        if self.config.withdrawal.enabled {
            self.monitor.start_monitoring()?;
        } else {
            info!("Withdrawal monitor disabled");
        }
        self.scheduler.start();
        Ok(())
    }

    /// Cancel every background task. Window and run state is left as is.
    pub async fn shutdown(&self) {
        info!("Shutting down background tasks");
        self.monitor.stop_monitoring().await;
        self.scheduler.stop().await;
    }

    pub fn status(&self) -> AppStatus {
        AppStatus {
            withdrawal: self.monitor.status(),
            distribution: self.scheduler.distribution_stats(),
            stablecoin: self.scheduler.stablecoin_stats(),
            last_distribution: self.scheduler.last_run(),
        }
    }
}
