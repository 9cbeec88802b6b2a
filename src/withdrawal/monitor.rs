//! Withdrawal monitor
//!
//! Polls the profit source on a fixed interval, feeds each reading to the
//! active [`WithdrawalWindow`], and runs the withdrawal pipeline inline when
//! the window triggers. The poll loop and the deadline timer live in one
//! task, so cancelling it stops both.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::pipeline::{WithdrawalKind, WithdrawalPipeline, WithdrawalRecord};
use super::window::{Observation, WindowSnapshot, WindowStatus, WithdrawalWindow};
use crate::config::WithdrawalConfig;
use crate::error::{Error, Result};
use crate::scheduling::{Clock, TaskHandle};
use crate::services::{
    notify_best_effort, record_best_effort, Ledger, LedgerEntry, NotificationSink, ProfitSource,
};

/// Result of a single poll
#[derive(Debug)]
pub enum PollOutcome {
    /// Below threshold, before deadline
    Continue,
    /// Threshold reached; the pipeline ran
    Triggered(WithdrawalRecord),
    /// Deadline passed first
    Expired,
}

/// Running totals, written only by the monitor
#[derive(Debug, Clone, Default, Serialize)]
pub struct WithdrawalStats {
    pub total_withdrawn_usd: Decimal,
    pub completed: u64,
    pub failed: u64,
    pub windows_expired: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub window: Option<WindowSnapshot>,
    pub stats: WithdrawalStats,
}

pub struct WithdrawalMonitor {
    config: WithdrawalConfig,
    profit: Arc<dyn ProfitSource>,
    pipeline: WithdrawalPipeline,
    notifier: Arc<dyn NotificationSink>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    window: Mutex<Option<WithdrawalWindow>>,
    task: Mutex<Option<TaskHandle>>,
    stats: Mutex<WithdrawalStats>,
}

impl WithdrawalMonitor {
    pub fn new(
        config: WithdrawalConfig,
        profit: Arc<dyn ProfitSource>,
        pipeline: WithdrawalPipeline,
        notifier: Arc<dyn NotificationSink>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            profit,
            pipeline,
            notifier,
            ledger,
            clock,
            window: Mutex::new(None),
            task: Mutex::new(None),
            stats: Mutex::new(WithdrawalStats::default()),
        }
    }

    /// Start polling, opening a new window when needed.
    ///
    /// A window left monitoring by `stop_monitoring` is resumed if its
    /// deadline is still ahead, or expired and replaced if it has passed.
    /// Fails with `InvalidTransition` while a poll loop is still running.
    pub fn start_monitoring(self: &Arc<Self>) -> Result<Uuid> {
        let now = self.clock.now();
        let running = self.is_running();

        let (window_id, until_deadline, resumed, lapsed) = {
            let mut slot = self.window.lock();
            match slot.as_mut() {
                Some(active) if active.status() == WindowStatus::Monitoring => {
                    if running {
                        return Err(Error::InvalidTransition(format!(
                            "window {} is still monitoring",
                            active.id()
                        )));
                    }

                    let remaining = active.remaining(now);
                    if remaining > chrono::Duration::zero() {
                        let until = remaining.to_std().unwrap_or(Duration::ZERO);
                        (active.id(), until, true, None)
                    } else {
                        active.mark_expired()?;
                        let lapsed = (active.id(), active.last_profit_usd());
                        let window = self.open_window(now)?;
                        let (id, until) = (window.id(), window.remaining(now).to_std().unwrap_or(Duration::ZERO));
                        *active = window;
                        (id, until, false, Some(lapsed))
                    }
                }
                _ => {
                    let window = self.open_window(now)?;
                    let (id, until) = (window.id(), window.remaining(now).to_std().unwrap_or(Duration::ZERO));
                    *slot = Some(window);
                    (id, until, false, None)
                }
            }
        };

        if let Some((lapsed_id, last_profit)) = lapsed {
            let monitor = Arc::clone(self);
            tokio::spawn(async move {
                monitor.report_expiry(lapsed_id, last_profit).await;
            });
        }

        if resumed {
            info!(
                "Withdrawal monitoring resumed (window: {}, {}s to deadline)",
                window_id,
                until_deadline.as_secs()
            );
        } else {
            info!(
                "Withdrawal monitoring started (window: {}, threshold: ${}, deadline: {}s, poll: {}s)",
                window_id,
                self.config.threshold_usd,
                self.config.deadline_secs,
                self.config.poll_interval_secs
            );
        }

        let token = CancellationToken::new();
        let monitor = Arc::clone(self);
        let loop_token = token.clone();
        let join = tokio::spawn(async move {
            monitor.run_loop(window_id, until_deadline, loop_token).await;
        });

        let previous = self
            .task
            .lock()
            .replace(TaskHandle::new("withdrawal-monitor", token, join));
        if let Some(previous) = previous {
            previous.cancel();
        }

        Ok(window_id)
    }

    fn open_window(&self, now: chrono::DateTime<chrono::Utc>) -> Result<WithdrawalWindow> {
        let mut window = WithdrawalWindow::new();
        window.start(self.config.threshold_usd, self.config.deadline(), now)?;
        Ok(window)
    }

    async fn run_loop(self: Arc<Self>, window_id: Uuid, until_deadline: Duration, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let deadline = tokio::time::sleep(until_deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Withdrawal monitoring of window {} stopped", window_id);
                    break;
                }
                _ = &mut deadline => {
                    self.close_at_deadline(window_id).await;
                    break;
                }
                _ = interval.tick() => {
                    match self.poll_once().await {
                        Ok(PollOutcome::Continue) => {}
                        Ok(_) => break,
                        // Already reported; keep polling until the deadline
                        Err(e) if e.is_external_failure() => {}
                        Err(e) if e.is_misuse() => {
                            debug!("Window {} no longer monitored: {}", window_id, e);
                            break;
                        }
                        Err(e) => {
                            error!("Polling window {} failed: {}", window_id, e);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Read profit once and advance the active window.
    ///
    /// Profit is read before the window is locked; the observation uses a
    /// single `now` taken under the lock.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let profit = match self.profit.accumulated_profit_usd().await {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to read accumulated profit: {}", e);
                notify_best_effort(
                    self.notifier.as_ref(),
                    "Withdrawal monitor",
                    &format!("Profit source unavailable: {}", e),
                )
                .await;
                return Err(e);
            }
        };

        let (window_id, observation) = {
            let mut slot = self.window.lock();
            let window = slot
                .as_mut()
                .ok_or_else(|| Error::InvalidTransition("no withdrawal window started".into()))?;
            let observation = window.observe(profit, self.clock.now())?;
            (window.id(), observation)
        };

        match observation {
            Observation::Continue => {
                debug!(
                    "Accumulated profit ${} below threshold ${}",
                    profit, self.config.threshold_usd
                );
                Ok(PollOutcome::Continue)
            }
            Observation::Expire => {
                self.report_expiry(window_id, Some(profit)).await;
                Ok(PollOutcome::Expired)
            }
            Observation::Trigger => {
                info!(
                    "Threshold ${} reached (profit: ${}), starting withdrawal",
                    self.config.threshold_usd, profit
                );
                let amount = profit.min(self.config.threshold_usd);
                let record = self
                    .pipeline
                    .execute(WithdrawalKind::Threshold, Some(window_id), amount)
                    .await;
                self.finish(Some(window_id), &record).await;
                Ok(PollOutcome::Triggered(record))
            }
        }
    }

    /// Final observation at the deadline; expires the window directly if
    /// no reading is available
    async fn close_at_deadline(&self, window_id: Uuid) {
        match self.poll_once().await {
            Ok(PollOutcome::Triggered(_)) | Ok(PollOutcome::Expired) => return,
            Ok(PollOutcome::Continue) => {}
            Err(Error::WindowClosed(_)) => return,
            Err(e) => debug!("Deadline observation of window {} failed: {}", window_id, e),
        }

        let expired = {
            let mut slot = self.window.lock();
            match slot.as_mut() {
                Some(window) if window.id() == window_id => window.mark_expired().is_ok(),
                _ => false,
            }
        };

        if expired {
            self.report_expiry(window_id, None).await;
        }
    }

    async fn report_expiry(&self, window_id: Uuid, last_profit: Option<Decimal>) {
        self.stats.lock().windows_expired += 1;

        let last = last_profit
            .map(|p| format!("${}", p))
            .unwrap_or_else(|| "unavailable".to_string());
        warn!(
            "Withdrawal window {} expired without reaching ${} (last profit: {})",
            window_id, self.config.threshold_usd, last
        );

        notify_best_effort(
            self.notifier.as_ref(),
            "Withdrawal window expired",
            &format!(
                "The {}h deadline was reached without the ${} threshold (last profit: {}).",
                self.config.deadline_secs / 3600,
                self.config.threshold_usd,
                last
            ),
        )
        .await;
    }

    async fn finish(&self, window_id: Option<Uuid>, record: &WithdrawalRecord) {
        if record.is_completed() {
            let mut slot = self.window.lock();
            if let Some(window) = slot.as_mut().filter(|w| Some(w.id()) == window_id) {
                if let Err(e) = window.mark_completed() {
                    warn!("Window {} not completed: {}", window.id(), e);
                }
            }
        }

        {
            let mut stats = self.stats.lock();
            if record.is_completed() {
                stats.completed += 1;
                stats.total_withdrawn_usd += record.amount_usd;
            } else {
                stats.failed += 1;
            }
        }

        let asset = &self.pipeline.request().asset;
        let (title, body) = if record.is_completed() {
            (format!("{} withdrawal completed", asset), record.summary())
        } else {
            (
                format!("{} withdrawal failed", asset),
                format!("{}. Manual follow-up required.", record.summary()),
            )
        };
        notify_best_effort(self.notifier.as_ref(), &title, &body).await;
        record_best_effort(self.ledger.as_ref(), &LedgerEntry::Withdrawal(record.clone())).await;
    }

    /// Withdraw `amount_usd` now.
    ///
    /// A window that is still monitoring is closed as triggered and its
    /// poll loop cancelled first.
    pub async fn force_withdrawal(&self, amount_usd: Decimal) -> Result<WithdrawalRecord> {
        if amount_usd <= Decimal::ZERO {
            return Err(Error::InvalidConfiguration(format!(
                "withdrawal amount must be positive, got {}",
                amount_usd
            )));
        }

        let window_id = {
            let mut slot = self.window.lock();
            match slot.as_mut() {
                Some(window) if window.status() == WindowStatus::Monitoring => {
                    window.force_trigger()?;
                    Some(window.id())
                }
                _ => None,
            }
        };

        if let Some(id) = window_id {
            info!("Forced withdrawal closes window {}", id);
            if let Some(handle) = self.task.lock().take() {
                handle.cancel();
            }
        }

        let record = self
            .pipeline
            .execute(WithdrawalKind::Forced, window_id, amount_usd)
            .await;
        self.finish(window_id, &record).await;
        Ok(record)
    }

    /// Cancel the poll loop and deadline timer. The window keeps whatever
    /// state it was last observed in.
    pub async fn stop_monitoring(&self) -> bool {
        let handle = self.task.lock().take();
        match handle {
            Some(handle) => {
                handle.shutdown().await;
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|h| !h.is_finished() && !h.is_cancelled())
            .unwrap_or(false)
    }

    pub fn window_status(&self) -> Option<WindowStatus> {
        self.window.lock().as_ref().map(|w| w.status())
    }

    pub fn stats(&self) -> WithdrawalStats {
        self.stats.lock().clone()
    }

    pub fn status(&self) -> MonitorStatus {
        let now = self.clock.now();
        MonitorStatus {
            running: self.is_running(),
            window: self.window.lock().as_ref().map(|w| w.snapshot(now)),
            stats: self.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::TokioClock;
    use crate::services::fakes::{FakeProfitSource, FakeRates, FakeTransferExecutor, RecordingNotifier};
    use crate::services::MemoryLedger;
    use crate::transfer::{ConfirmationPolicy, TransferDispatcher, TransferRequest};
    use rust_decimal_macros::dec;

    struct Harness {
        monitor: Arc<WithdrawalMonitor>,
        profit: Arc<FakeProfitSource>,
        executor: Arc<FakeTransferExecutor>,
        notifier: Arc<RecordingNotifier>,
        ledger: Arc<MemoryLedger>,
    }

    fn harness(starting_profit: Decimal) -> Harness {
        harness_with(
            WithdrawalConfig {
                threshold_usd: dec!(100000),
                deadline_secs: 3 * 3600,
                poll_interval_secs: 300,
                ..WithdrawalConfig::default()
            },
            starting_profit,
        )
    }

    fn harness_with(config: WithdrawalConfig, starting_profit: Decimal) -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let profit = Arc::new(FakeProfitSource::new(starting_profit));
        let executor = Arc::new(FakeTransferExecutor::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let ledger = Arc::new(MemoryLedger::new());

        let dispatcher = Arc::new(TransferDispatcher::new(
            Arc::new(FakeRates::default()),
            executor.clone(),
            ConfirmationPolicy {
                min_confirmations: 3,
                timeout: Duration::from_secs(600),
                poll_interval: Duration::from_secs(10),
            },
            clock.clone(),
        ));
        let pipeline = WithdrawalPipeline::new(
            dispatcher,
            TransferRequest::new("BTC", "bitcoin", "bc1qdest"),
            8,
            clock.clone(),
        );

        let monitor = Arc::new(WithdrawalMonitor::new(
            config,
            profit.clone(),
            pipeline,
            notifier.clone(),
            ledger.clone(),
            clock,
        ));

        Harness {
            monitor,
            profit,
            executor,
            notifier,
            ledger,
        }
    }

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_once_at_threshold() {
        let h = harness(dec!(50000));
        h.monitor.start_monitoring().unwrap();

        tokio::time::sleep(minutes(12)).await;
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Monitoring));
        assert!(h.executor.submitted().is_empty());

        h.profit.set(dec!(120000));
        tokio::time::sleep(minutes(15)).await;

        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Completed));
        let submitted = h.executor.submitted();
        assert_eq!(submitted.len(), 1);
        // Capped at the threshold: 100000 / 65000
        assert_eq!(submitted[0].amount, dec!(1.53846153));

        let stats = h.monitor.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total_withdrawn_usd, dec!(100000));
        assert_eq!(h.ledger.len().await, 1);
        assert!(h.notifier.titles().contains(&"BTC withdrawal completed".to_string()));

        // Loop exited; later readings do nothing
        let reads = h.profit.reads();
        tokio::time::sleep(minutes(60)).await;
        assert_eq!(h.profit.reads(), reads);
        assert_eq!(h.executor.submitted().len(), 1);
        assert!(!h.monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_at_deadline() {
        let h = harness(dec!(50000));
        h.monitor.start_monitoring().unwrap();

        tokio::time::sleep(Duration::from_secs(3 * 3600) + minutes(1)).await;

        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Expired));
        assert!(h.executor.submitted().is_empty());
        assert_eq!(h.monitor.stats().windows_expired, 1);
        assert_eq!(h.notifier.titles(), vec!["Withdrawal window expired".to_string()]);
        assert!(!h.monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_failure_leaves_window_triggered() {
        let h = harness(dec!(150000));
        h.executor.set_balance("BTC", dec!(0.1));
        h.monitor.start_monitoring().unwrap();

        tokio::time::sleep(minutes(1)).await;

        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Triggered));
        assert!(h.executor.submitted().is_empty());
        assert_eq!(h.monitor.stats().failed, 1);
        assert!(h.notifier.titles().contains(&"BTC withdrawal failed".to_string()));

        // No retry, no reopening
        tokio::time::sleep(minutes(30)).await;
        assert!(h.executor.submitted().is_empty());
        assert!(matches!(
            h.monitor.poll_once().await,
            Err(Error::WindowClosed(WindowStatus::Triggered))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_leaves_window_untouched() {
        let h = harness(dec!(50000));
        h.monitor.start_monitoring().unwrap();
        tokio::time::sleep(minutes(6)).await;

        assert!(h.monitor.stop_monitoring().await);
        let reads = h.profit.reads();

        tokio::time::sleep(Duration::from_secs(4 * 3600)).await;
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Monitoring));
        assert_eq!(h.profit.reads(), reads);
        assert!(h.notifier.messages().is_empty());
        assert!(!h.monitor.stop_monitoring().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_replaces_lapsed_window() {
        let h = harness(dec!(50000));
        let first = h.monitor.start_monitoring().unwrap();
        tokio::time::sleep(minutes(1)).await;
        assert!(h.monitor.stop_monitoring().await);

        tokio::time::sleep(Duration::from_secs(5 * 3600)).await;
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Monitoring));

        let second = h.monitor.start_monitoring().unwrap();
        assert_ne!(first, second);
        assert!(h.monitor.is_running());
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Monitoring));

        tokio::time::sleep(minutes(1)).await;
        assert_eq!(h.monitor.stats().windows_expired, 1);
        assert_eq!(h.notifier.titles(), vec!["Withdrawal window expired".to_string()]);

        // The new window triggers normally
        h.profit.set(dec!(100000));
        tokio::time::sleep(minutes(10)).await;
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Completed));
        assert_eq!(h.executor.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_before_deadline_resumes_window() {
        let h = harness(dec!(50000));
        let first = h.monitor.start_monitoring().unwrap();
        tokio::time::sleep(minutes(6)).await;
        assert!(h.monitor.stop_monitoring().await);
        tokio::time::sleep(minutes(30)).await;

        let resumed = h.monitor.start_monitoring().unwrap();
        assert_eq!(resumed, first);
        assert!(h.monitor.is_running());
        assert!(matches!(
            h.monitor.start_monitoring(),
            Err(Error::InvalidTransition(_))
        ));

        // Original deadline still applies: 3h from the first start
        tokio::time::sleep(Duration::from_secs(3 * 3600) - minutes(36) + minutes(1)).await;
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Expired));
        assert_eq!(h.monitor.stats().windows_expired, 1);
        assert!(!h.monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_reached_as_deadline_fires() {
        // 7 min polls never land on the 3h deadline: last poll at 2h55m
        let h = harness_with(
            WithdrawalConfig {
                threshold_usd: dec!(100000),
                deadline_secs: 3 * 3600,
                poll_interval_secs: 420,
                ..WithdrawalConfig::default()
            },
            dec!(50000),
        );
        h.monitor.start_monitoring().unwrap();

        tokio::time::sleep(minutes(177)).await;
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Monitoring));
        h.profit.set(dec!(100000));

        tokio::time::sleep(minutes(5)).await;

        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Completed));
        assert_eq!(h.executor.submitted().len(), 1);
        assert_eq!(h.monitor.stats().windows_expired, 0);
        assert_eq!(h.monitor.stats().completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_monitoring_window_at_a_time() {
        let h = harness(dec!(50000));
        let first = h.monitor.start_monitoring().unwrap();
        assert!(matches!(
            h.monitor.start_monitoring(),
            Err(Error::InvalidTransition(_))
        ));

        tokio::time::sleep(Duration::from_secs(3 * 3600) + minutes(1)).await;
        let second = h.monitor.start_monitoring().unwrap();
        assert_ne!(first, second);
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Monitoring));
        h.monitor.stop_monitoring().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_outage_keeps_polling() {
        let h = harness(dec!(50000));
        h.profit.set_failing(true);
        h.monitor.start_monitoring().unwrap();

        tokio::time::sleep(minutes(11)).await;
        assert_eq!(h.profit.reads(), 3);
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Monitoring));
        assert!(h.monitor.is_running());

        h.profit.set_failing(false);
        h.profit.set(dec!(100000));
        tokio::time::sleep(minutes(10)).await;
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_polls_trigger_once() {
        let h = harness(dec!(100000));
        {
            let now = h.monitor.clock.now();
            let mut window = WithdrawalWindow::new();
            window
                .start(dec!(100000), chrono::Duration::hours(3), now)
                .unwrap();
            *h.monitor.window.lock() = Some(window);
        }

        let (a, b) = tokio::join!(h.monitor.poll_once(), h.monitor.poll_once());
        let triggered = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Ok(PollOutcome::Triggered(_))))
            .count();
        let closed = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(Error::WindowClosed(_))))
            .count();

        assert_eq!(triggered, 1);
        assert_eq!(closed, 1);
        assert_eq!(h.executor.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_withdrawal_closes_window() {
        let h = harness(dec!(20000));
        let window_id = h.monitor.start_monitoring().unwrap();

        let record = h.monitor.force_withdrawal(dec!(6500)).await.unwrap();

        assert!(record.is_completed());
        assert_eq!(record.window_id, Some(window_id));
        // 6500 USD at 65000, truncated
        let amount = record.amount_asset.unwrap();
        assert!(amount > dec!(0.0999) && amount <= dec!(0.1));
        assert_eq!(h.monitor.window_status(), Some(WindowStatus::Completed));

        let reads = h.profit.reads();
        tokio::time::sleep(minutes(30)).await;
        assert_eq!(h.profit.reads(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_withdrawal_without_window() {
        let h = harness(dec!(0));
        let record = h.monitor.force_withdrawal(dec!(6500)).await.unwrap();
        assert!(record.is_completed());
        assert!(record.window_id.is_none());
        assert!(h.monitor.window_status().is_none());

        assert!(matches!(
            h.monitor.force_withdrawal(Decimal::ZERO).await,
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_snapshot() {
        let h = harness(dec!(25000));
        h.monitor.start_monitoring().unwrap();
        tokio::time::sleep(minutes(1)).await;

        let status = h.monitor.status();
        assert!(status.running);
        let window = status.window.unwrap();
        assert_eq!(window.status, WindowStatus::Monitoring);
        assert_eq!(window.progress_pct, dec!(25));
        assert_eq!(window.last_profit_usd, Some(dec!(25000)));
        h.monitor.stop_monitoring().await;
    }
}
