//! Distribution scheduler
//!
//! Owns two recurring cycles:
//!
//! - **distribution**: split accumulated profit across the destination
//!   table and send one leg per wallet network. Legs run concurrently and
//!   fail independently; nothing is rolled back.
//! - **stablecoin**: sweep the stablecoin balance, capped by a ceiling.
//!
//! A tick that arrives while the same cycle is still running is skipped.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::plan::{compute_plan, split_evenly, Allocation, AllocationEntry, DistributionPlan};
use super::types::{DistributionRun, Leg, LegKind, LegStatus, PlannedLeg, RunOutcome, RunTrigger};
use crate::config::{DestinationKind, DistributionConfig, StablecoinConfig};
use crate::error::{Error, Result};
use crate::scheduling::{delay_until_aligned, spawn_periodic, Clock, OverlapGuard, TaskHandle};
use crate::services::{
    notify_best_effort, record_best_effort, Ledger, LedgerEntry, NotificationSink, ProfitSource,
};
use crate::transfer::{SendOutcome, TransferDispatcher, TransferRequest};
use crate::withdrawal::{WithdrawalKind, WithdrawalOutcome, WithdrawalRecord};

/// Result of one cycle tick
#[derive(Debug)]
pub enum CycleResult<T> {
    Executed(T),
    /// Nothing to distribute or sweep
    NothingToDo,
    /// Previous run of the cycle still in flight
    Skipped,
}

impl<T> CycleResult<T> {
    pub fn executed(self) -> Option<T> {
        match self {
            CycleResult::Executed(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DistributionStats {
    pub runs: u64,
    pub completed: u64,
    pub partially_failed: u64,
    pub failed: u64,
    pub total_distributed_usd: Decimal,
    pub skipped_ticks: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StablecoinStats {
    pub sweeps: u64,
    pub failed: u64,
    pub total_withdrawn_usd: Decimal,
    pub skipped_ticks: u64,
}

/// A leg before execution
enum LegSpec {
    Transfer {
        destination_id: String,
        request: TransferRequest,
        asset_decimals: u32,
        amount_usd: Decimal,
    },
    Reinvestment {
        destination_id: String,
        strategy: String,
        amount_usd: Decimal,
    },
}

impl LegSpec {
    fn planned(&self) -> PlannedLeg {
        match self {
            LegSpec::Transfer {
                destination_id,
                request,
                amount_usd,
                ..
            } => PlannedLeg {
                destination_id: destination_id.clone(),
                kind: LegKind::Transfer,
                target: request.network.clone(),
                amount_usd: *amount_usd,
            },
            LegSpec::Reinvestment {
                destination_id,
                strategy,
                amount_usd,
            } => PlannedLeg {
                destination_id: destination_id.clone(),
                kind: LegKind::Reinvestment,
                target: strategy.clone(),
                amount_usd: *amount_usd,
            },
        }
    }
}

pub struct DistributionScheduler {
    config: DistributionConfig,
    stablecoin: StablecoinConfig,
    profit: Arc<dyn ProfitSource>,
    dispatcher: Arc<TransferDispatcher>,
    notifier: Arc<dyn NotificationSink>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    distribution_guard: OverlapGuard,
    stablecoin_guard: OverlapGuard,
    distribution_stats: Mutex<DistributionStats>,
    stablecoin_stats: Mutex<StablecoinStats>,
    last_run: RwLock<Option<DistributionRun>>,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl DistributionScheduler {
    pub fn new(
        config: DistributionConfig,
        stablecoin: StablecoinConfig,
        profit: Arc<dyn ProfitSource>,
        dispatcher: Arc<TransferDispatcher>,
        notifier: Arc<dyn NotificationSink>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            stablecoin,
            profit,
            dispatcher,
            notifier,
            ledger,
            clock,
            distribution_guard: OverlapGuard::new("distribution"),
            stablecoin_guard: OverlapGuard::new("stablecoin"),
            distribution_stats: Mutex::new(DistributionStats::default()),
            stablecoin_stats: Mutex::new(StablecoinStats::default()),
            last_run: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the enabled recurring cycles. Each start gets its own
    /// cancellation, so the scheduler can be restarted after `stop`.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Distribution scheduler already started");
            return;
        }

        if self.config.enabled {
            let period = self.config.period();
            let first_delay = if self.config.align_to_period {
                delay_until_aligned(self.clock.now(), period)
            } else {
                period
            };
            let scheduler = Arc::clone(self);
            tasks.push(spawn_periodic(
                "distribution",
                period,
                first_delay,
                CancellationToken::new(),
                move || {
                    let scheduler = Arc::clone(&scheduler);
                    async move {
                        if let Err(e) = scheduler.run_distribution_tick().await {
                            error!("Scheduled distribution failed: {}", e);
                        }
                    }
                },
            ));
        }

        if self.stablecoin.enabled {
            let period = self.stablecoin.period();
            let first_delay = if self.stablecoin.align_to_period {
                delay_until_aligned(self.clock.now(), period)
            } else {
                period
            };
            let scheduler = Arc::clone(self);
            tasks.push(spawn_periodic(
                "stablecoin",
                period,
                first_delay,
                CancellationToken::new(),
                move || {
                    let scheduler = Arc::clone(&scheduler);
                    async move {
                        if let Err(e) = scheduler.run_stablecoin_tick().await {
                            error!("Scheduled stablecoin withdrawal failed: {}", e);
                        }
                    }
                },
            ));
        }

        info!("Distribution scheduler started ({} cycles)", tasks.len());
    }

    /// Cancel both cycles. Runs already in flight finish on their own.
    pub async fn stop(&self) {
        let tasks: Vec<TaskHandle> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.shutdown().await;
        }
    }

    /// Whether any recurring cycle is still scheduled
    pub fn is_running(&self) -> bool {
        self.tasks
            .lock()
            .iter()
            .any(|t| !t.is_finished() && !t.is_cancelled())
    }

    /// One scheduled distribution tick
    pub async fn run_distribution_tick(&self) -> Result<CycleResult<DistributionRun>> {
        let Some(_cycle) = self.distribution_guard.try_enter() else {
            return Ok(CycleResult::Skipped);
        };

        let profit = match self.profit.accumulated_profit_usd().await {
            Ok(p) => p,
            Err(e) => {
                self.report_cycle_error("Distribution error", &e).await;
                return Err(e);
            }
        };
        info!("Accumulated profit for distribution: ${}", profit);

        if profit <= Decimal::ZERO {
            info!("No accumulated profit to distribute");
            return Ok(CycleResult::NothingToDo);
        }

        let run = self.execute_run(profit, RunTrigger::Scheduled).await?;
        Ok(CycleResult::Executed(run))
    }

    /// Distribute `amount_usd` now, outside the schedule
    pub async fn distribute_manual(&self, amount_usd: Decimal) -> Result<DistributionRun> {
        if amount_usd <= Decimal::ZERO {
            return Err(Error::InvalidConfiguration(format!(
                "distribution amount must be positive, got {}",
                amount_usd
            )));
        }

        let _cycle = self
            .distribution_guard
            .try_enter()
            .ok_or_else(|| Error::CycleBusy("distribution".into()))?;

        info!("Manual distribution of ${}", amount_usd);
        self.execute_run(amount_usd, RunTrigger::Manual).await
    }

    async fn execute_run(&self, total_usd: Decimal, trigger: RunTrigger) -> Result<DistributionRun> {
        let triggered_at = self.clock.now();
        let decimals = self.config.amount_decimals;

        // Plan errors abort the run before any transfer
        let planned = compute_plan(total_usd, &self.config.allocation_table(), decimals).and_then(|plan| {
            let specs = self.leg_specs(&plan.allocations)?;
            Ok((plan, specs))
        });
        let (plan, specs) = match planned {
            Ok(v) => v,
            Err(e) => {
                self.report_cycle_error("Distribution error", &e).await;
                return Err(e);
            }
        };

        info!(
            "Distribution plan: {} (operational: ${})",
            plan.allocations
                .iter()
                .map(|a| format!("{}=${}", a.destination_id, a.amount_usd))
                .collect::<Vec<_>>()
                .join(", "),
            plan.unallocated_usd
        );

        let legs = join_all(specs.into_iter().map(|spec| self.execute_leg(spec))).await;
        let outcome = RunOutcome::classify(&legs);

        let run = DistributionRun {
            id: Uuid::new_v4(),
            triggered_at,
            trigger,
            plan,
            legs,
            outcome,
        };

        {
            let mut stats = self.distribution_stats.lock();
            stats.runs += 1;
            match outcome {
                RunOutcome::Completed => stats.completed += 1,
                RunOutcome::PartiallyFailed => stats.partially_failed += 1,
                RunOutcome::Failed => stats.failed += 1,
            }
            stats.total_distributed_usd += run.distributed_usd();
        }
        *self.last_run.write() = Some(run.clone());

        match outcome {
            RunOutcome::Completed => info!("Distribution {} completed", run.id),
            _ => warn!(
                "Distribution {} {} ({} failed legs)",
                run.id,
                outcome,
                run.failed_legs().count()
            ),
        }

        let title = match outcome {
            RunOutcome::Completed => "Profit distribution completed",
            RunOutcome::PartiallyFailed => "Profit distribution partially failed",
            RunOutcome::Failed => "Profit distribution failed",
        };
        notify_best_effort(self.notifier.as_ref(), title, &run.summary()).await;
        record_best_effort(self.ledger.as_ref(), &LedgerEntry::Distribution(run.clone())).await;

        Ok(run)
    }

    /// Plan and fan out `total_usd` without sending anything
    pub fn preview(&self, total_usd: Decimal) -> Result<(DistributionPlan, Vec<PlannedLeg>)> {
        let plan = compute_plan(total_usd, &self.config.allocation_table(), self.config.amount_decimals)?;
        let legs = self
            .leg_specs(&plan.allocations)?
            .iter()
            .map(LegSpec::planned)
            .collect();
        Ok((plan, legs))
    }

    /// Fan each allocation out into legs: wallets evenly over their
    /// networks, reinvestment over its strategies
    fn leg_specs(&self, allocations: &[Allocation]) -> Result<Vec<LegSpec>> {
        let decimals = self.config.amount_decimals;
        let mut specs = Vec::new();

        for allocation in allocations {
            let dest = self.config.destination(&allocation.destination_id).ok_or_else(|| {
                Error::Internal(format!("unknown destination {}", allocation.destination_id))
            })?;

            match dest.kind {
                DestinationKind::Wallet => {
                    for (network, amount_usd) in split_evenly(allocation.amount_usd, &dest.networks, decimals)? {
                        specs.push(LegSpec::Transfer {
                            destination_id: dest.id.clone(),
                            request: TransferRequest::new(&dest.asset, network, &dest.address),
                            asset_decimals: dest.asset_decimals,
                            amount_usd,
                        });
                    }
                }
                DestinationKind::Reinvestment if dest.strategies.is_empty() => {
                    specs.push(LegSpec::Reinvestment {
                        destination_id: dest.id.clone(),
                        strategy: dest.id.clone(),
                        amount_usd: allocation.amount_usd,
                    });
                }
                DestinationKind::Reinvestment => {
                    let table: Vec<AllocationEntry> = dest
                        .strategies
                        .iter()
                        .map(|s| AllocationEntry::new(s.name.clone(), s.percentage))
                        .collect();
                    let sub = compute_plan(allocation.amount_usd, &table, decimals)?;

                    // The whole bucket is reinvested; the remainder joins the first strategy
                    for (i, part) in sub.allocations.into_iter().enumerate() {
                        let amount_usd = if i == 0 {
                            part.amount_usd + sub.unallocated_usd
                        } else {
                            part.amount_usd
                        };
                        specs.push(LegSpec::Reinvestment {
                            destination_id: dest.id.clone(),
                            strategy: part.destination_id,
                            amount_usd,
                        });
                    }
                }
            }
        }

        Ok(specs)
    }

    async fn execute_leg(&self, spec: LegSpec) -> Leg {
        let (destination_id, request, asset_decimals, amount_usd) = match spec {
            LegSpec::Reinvestment {
                destination_id,
                strategy,
                amount_usd,
            } => {
                info!("Reinvesting ${} in {}", amount_usd, strategy);
                return Leg::reinvestment(&destination_id, &strategy, amount_usd);
            }
            LegSpec::Transfer {
                destination_id,
                request,
                asset_decimals,
                amount_usd,
            } => (destination_id, request, asset_decimals, amount_usd),
        };

        let mut leg = Leg {
            destination_id,
            kind: LegKind::Transfer,
            target: request.network.clone(),
            amount_usd,
            asset: Some(request.asset.clone()),
            amount_asset: None,
            transfer: None,
            status: LegStatus::Failed,
            error: None,
        };

        let quote = match self
            .dispatcher
            .quote(amount_usd, &request.asset, asset_decimals)
            .await
        {
            Ok(q) => q,
            Err(e) => {
                error!("{} leg on {} not priced: {}", leg.destination_id, leg.target, e);
                leg.error = Some(e.to_string());
                return leg;
            }
        };
        leg.amount_asset = Some(quote.amount);

        if quote.amount <= Decimal::ZERO {
            info!(
                "{} leg on {} below {} precision, skipped",
                leg.destination_id, leg.target, request.asset
            );
            leg.status = LegStatus::Skipped;
            return leg;
        }

        let outcome = self.dispatcher.send(&request, quote.amount).await;
        if let Some(e) = outcome.error() {
            error!("{} leg on {} failed: {}", leg.destination_id, leg.target, e);
            leg.error = Some(e.to_string());
        }
        match outcome {
            SendOutcome::Confirmed(transfer) | SendOutcome::Unconfirmed(transfer, _) => {
                leg.status = LegStatus::from(transfer.status);
                leg.transfer = Some(transfer);
            }
            SendOutcome::NotSubmitted(_) => {}
        }

        leg
    }

    /// One stablecoin sweep: withdraw `min(available, ceiling)`
    pub async fn run_stablecoin_tick(&self) -> Result<CycleResult<WithdrawalRecord>> {
        let Some(_cycle) = self.stablecoin_guard.try_enter() else {
            return Ok(CycleResult::Skipped);
        };

        let cfg = &self.stablecoin;
        let available = match self.dispatcher.available_balance(&cfg.asset, &cfg.network).await {
            Ok(b) => b,
            Err(e) => {
                self.report_cycle_error("Stablecoin withdrawal error", &e).await;
                return Err(e);
            }
        };
        info!("Available {} for withdrawal: {}", cfg.asset, available);

        if available <= Decimal::ZERO {
            info!("No {} balance to withdraw", cfg.asset);
            return Ok(CycleResult::NothingToDo);
        }

        let mut record = WithdrawalRecord {
            id: Uuid::new_v4(),
            kind: WithdrawalKind::Stablecoin,
            window_id: None,
            triggered_at: self.clock.now(),
            amount_usd: Decimal::ZERO,
            asset: cfg.asset.clone(),
            rate: None,
            amount_asset: None,
            transfer: None,
            outcome: WithdrawalOutcome::Failed,
            error: None,
        };

        match self.sweep(&mut record, available).await {
            Ok(()) => {
                record.outcome = WithdrawalOutcome::Completed;
                info!("Stablecoin withdrawal completed: {}", record.summary());
            }
            Err(e) => {
                error!("Stablecoin withdrawal failed: {}", e);
                record.error = Some(e.to_string());
            }
        }

        {
            let mut stats = self.stablecoin_stats.lock();
            if record.is_completed() {
                stats.sweeps += 1;
                stats.total_withdrawn_usd += record.amount_usd;
            } else {
                stats.failed += 1;
            }
        }

        let title = if record.is_completed() {
            format!("{} withdrawal completed", cfg.asset)
        } else {
            format!("{} withdrawal failed", cfg.asset)
        };
        notify_best_effort(self.notifier.as_ref(), &title, &record.summary()).await;
        record_best_effort(self.ledger.as_ref(), &LedgerEntry::Withdrawal(record.clone())).await;

        Ok(CycleResult::Executed(record))
    }

    async fn sweep(&self, record: &mut WithdrawalRecord, available: Decimal) -> Result<()> {
        let cfg = &self.stablecoin;

        let ceiling = self
            .dispatcher
            .quote(cfg.ceiling_usd, &cfg.asset, cfg.asset_decimals)
            .await?;
        let amount = available.min(ceiling.amount);
        record.rate = Some(ceiling.rate);
        record.amount_asset = Some(amount);
        record.amount_usd = (amount / ceiling.rate).round_dp(2);

        let request = TransferRequest::new(&cfg.asset, &cfg.network, &cfg.address);
        match self.dispatcher.send(&request, amount).await {
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

    async fn report_cycle_error(&self, title: &str, e: &Error) {
        error!("{}: {}", title, e);
        notify_best_effort(self.notifier.as_ref(), title, &e.to_string()).await;
    }

    pub fn distribution_stats(&self) -> DistributionStats {
        let mut stats = self.distribution_stats.lock().clone();
        stats.skipped_ticks = self.distribution_guard.skipped();
        stats
    }

    pub fn stablecoin_stats(&self) -> StablecoinStats {
        let mut stats = self.stablecoin_stats.lock().clone();
        stats.skipped_ticks = self.stablecoin_guard.skipped();
        stats
    }

    pub fn last_run(&self) -> Option<DistributionRun> {
        self.last_run.read().clone()
    }

    pub fn is_distribution_running(&self) -> bool {
        self.distribution_guard.is_busy()
    }

    /// Next distribution tick when started now, for status output
    pub fn next_distribution_at(&self) -> Option<chrono::DateTime<Utc>> {
        if !self.config.enabled {
            return None;
        }
        let now = self.clock.now();
        let delay = if self.config.align_to_period {
            delay_until_aligned(now, self.config.period())
        } else {
            self.config.period()
        };
        chrono::Duration::from_std(delay).ok().map(|d| now + d)
    }
}
