//! Withdrawal window state machine
//!
//! One window is one bounded monitoring episode. It starts `Idle`, moves to
//! `Monitoring` on [`WithdrawalWindow::start`], and leaves `Monitoring`
//! exactly once:
//!
//! ```text
//! Idle ──start──▶ Monitoring ──observe: Trigger──▶ Triggered ──mark_completed──▶ Completed
//!                     │
//!                     └──observe: Expire / mark_expired──▶ Expired
//! ```
//!
//! Terminal windows are never reopened; a new episode needs a new window.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Idle,
    Monitoring,
    Triggered,
    Expired,
    Completed,
}

impl WindowStatus {
    /// No further observation is possible
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            WindowStatus::Triggered | WindowStatus::Expired | WindowStatus::Completed
        )
    }
}

impl std::fmt::Display for WindowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowStatus::Idle => write!(f, "idle"),
            WindowStatus::Monitoring => write!(f, "monitoring"),
            WindowStatus::Triggered => write!(f, "triggered"),
            WindowStatus::Expired => write!(f, "expired"),
            WindowStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Result of one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Continue,
    Trigger,
    Expire,
}

/// Point-in-time view of a window
#[derive(Debug, Clone, Serialize)]
pub struct WindowSnapshot {
    pub id: Uuid,
    pub status: WindowStatus,
    pub threshold_usd: Decimal,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub elapsed_secs: i64,
    pub remaining_secs: i64,
    pub last_profit_usd: Option<Decimal>,
    /// Last observed profit as a share of the threshold, capped at 100
    pub progress_pct: Decimal,
}

#[derive(Debug, Clone)]
pub struct WithdrawalWindow {
    id: Uuid,
    status: WindowStatus,
    threshold_usd: Decimal,
    started_at: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    last_profit_usd: Option<Decimal>,
}

impl Default for WithdrawalWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl WithdrawalWindow {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: WindowStatus::Idle,
            threshold_usd: Decimal::ZERO,
            started_at: None,
            deadline: None,
            last_profit_usd: None,
        }
    }

    /// Begin monitoring. `deadline = now + duration` is fixed for the
    /// window's lifetime.
    pub fn start(&mut self, threshold_usd: Decimal, duration: Duration, now: DateTime<Utc>) -> Result<()> {
        if threshold_usd <= Decimal::ZERO {
            return Err(Error::InvalidConfiguration(format!(
                "withdrawal threshold must be positive, got {}",
                threshold_usd
            )));
        }
        if duration <= Duration::zero() {
            return Err(Error::InvalidConfiguration(format!(
                "withdrawal window duration must be positive, got {}s",
                duration.num_seconds()
            )));
        }
        if self.status != WindowStatus::Idle {
            return Err(Error::InvalidTransition(format!(
                "window {} cannot start from {}",
                self.id, self.status
            )));
        }

        self.threshold_usd = threshold_usd;
        self.started_at = Some(now);
        self.deadline = Some(now + duration);
        self.status = WindowStatus::Monitoring;
        Ok(())
    }

    /// Evaluate one `(profit, now)` pair.
    ///
    /// The threshold is checked before the deadline, so reaching it at the
    /// deadline instant still triggers. `Trigger` and `Expire` close the
    /// window before returning.
    pub fn observe(&mut self, current_profit_usd: Decimal, now: DateTime<Utc>) -> Result<Observation> {
        self.ensure_monitoring()?;
        self.last_profit_usd = Some(current_profit_usd);

        if current_profit_usd >= self.threshold_usd {
            self.status = WindowStatus::Triggered;
            return Ok(Observation::Trigger);
        }

        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.status = WindowStatus::Expired;
                Ok(Observation::Expire)
            }
            _ => Ok(Observation::Continue),
        }
    }

    /// Close the window as triggered without an observation (operator
    /// override)
    pub fn force_trigger(&mut self) -> Result<()> {
        self.ensure_monitoring()?;
        self.status = WindowStatus::Triggered;
        Ok(())
    }

    /// Triggered → Completed, once the withdrawal settled
    pub fn mark_completed(&mut self) -> Result<()> {
        if self.status != WindowStatus::Triggered {
            return Err(Error::InvalidTransition(format!(
                "window {} cannot complete from {}",
                self.id, self.status
            )));
        }
        self.status = WindowStatus::Completed;
        Ok(())
    }

    /// Monitoring → Expired, when the deadline passes without an observation
    pub fn mark_expired(&mut self) -> Result<()> {
        if self.status != WindowStatus::Monitoring {
            return Err(Error::InvalidTransition(format!(
                "window {} cannot expire from {}",
                self.id, self.status
            )));
        }
        self.status = WindowStatus::Expired;
        Ok(())
    }

    fn ensure_monitoring(&self) -> Result<()> {
        match self.status {
            WindowStatus::Monitoring => Ok(()),
            WindowStatus::Idle => Err(Error::InvalidTransition(format!(
                "window {} has not been started",
                self.id
            ))),
            closed => Err(Error::WindowClosed(closed)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> WindowStatus {
        self.status
    }

    pub fn threshold_usd(&self) -> Decimal {
        self.threshold_usd
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn last_profit_usd(&self) -> Option<Decimal> {
        self.last_profit_usd
    }

    /// Time left until the deadline, zero once passed
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.deadline {
            Some(deadline) if deadline > now => deadline - now,
            _ => Duration::zero(),
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> WindowSnapshot {
        let elapsed_secs = self
            .started_at
            .map(|s| (now - s).num_seconds().max(0))
            .unwrap_or(0);

        let progress_pct = match self.last_profit_usd {
            Some(profit) if self.threshold_usd > Decimal::ZERO => profit
                .checked_div(self.threshold_usd)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                // Overflow only happens far past the threshold
                .map_or(Decimal::ONE_HUNDRED, |pct| pct.min(Decimal::ONE_HUNDRED))
                .round_dp(2),
            _ => Decimal::ZERO,
        };

        WindowSnapshot {
            id: self.id,
            status: self.status,
            threshold_usd: self.threshold_usd,
            started_at: self.started_at,
            deadline: self.deadline,
            elapsed_secs,
            remaining_secs: self.remaining(now).num_seconds(),
            last_profit_usd: self.last_profit_usd,
            progress_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn started() -> WithdrawalWindow {
        let mut window = WithdrawalWindow::new();
        window.start(dec!(100000), Duration::hours(3), t0()).unwrap();
        window
    }

    #[test]
    fn test_start_sets_deadline() {
        let window = started();
        assert_eq!(window.status(), WindowStatus::Monitoring);
        assert_eq!(window.started_at(), Some(t0()));
        assert_eq!(window.deadline(), Some(t0() + Duration::hours(3)));
    }

    #[test]
    fn test_start_rejects_bad_parameters() {
        let mut window = WithdrawalWindow::new();
        assert!(matches!(
            window.start(Decimal::ZERO, Duration::hours(3), t0()),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            window.start(dec!(100), Duration::zero(), t0()),
            Err(Error::InvalidConfiguration(_))
        ));
        assert_eq!(window.status(), WindowStatus::Idle);
    }

    #[test]
    fn test_start_twice_is_invalid() {
        let mut window = started();
        assert!(matches!(
            window.start(dec!(1), Duration::hours(1), t0()),
            Err(Error::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_continue_below_threshold() {
        let mut window = started();
        let at = t0() + Duration::hours(2) + Duration::minutes(29);
        assert_eq!(window.observe(dec!(99999), at).unwrap(), Observation::Continue);
        assert_eq!(window.status(), WindowStatus::Monitoring);
    }

    #[test]
    fn test_trigger_at_threshold() {
        let mut window = started();
        let at = t0() + Duration::hours(2) + Duration::minutes(30);
        assert_eq!(window.observe(dec!(100000), at).unwrap(), Observation::Trigger);
        assert_eq!(window.status(), WindowStatus::Triggered);
    }

    #[test]
    fn test_expire_after_deadline() {
        let mut window = started();
        let at = t0() + Duration::hours(3) + Duration::minutes(1);
        assert_eq!(window.observe(dec!(50000), at).unwrap(), Observation::Expire);
        assert_eq!(window.status(), WindowStatus::Expired);
    }

    #[test]
    fn test_threshold_wins_at_deadline() {
        let mut window = started();
        let at = t0() + Duration::hours(3);
        assert_eq!(window.observe(dec!(100000), at).unwrap(), Observation::Trigger);

        let mut late = started();
        let at = t0() + Duration::hours(5);
        assert_eq!(late.observe(dec!(250000), at).unwrap(), Observation::Trigger);
    }

    #[test]
    fn test_closed_window_rejects_observe() {
        let mut window = started();
        window.observe(dec!(100000), t0()).unwrap();

        match window.observe(dec!(100000), t0()) {
            Err(Error::WindowClosed(status)) => assert_eq!(status, WindowStatus::Triggered),
            other => panic!("expected WindowClosed, got {:?}", other),
        }

        window.mark_completed().unwrap();
        assert!(matches!(
            window.observe(dec!(1), t0()),
            Err(Error::WindowClosed(WindowStatus::Completed))
        ));
    }

    #[test]
    fn test_observe_before_start() {
        let mut window = WithdrawalWindow::new();
        assert!(matches!(
            window.observe(dec!(1), t0()),
            Err(Error::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_terminal_transitions_only_once() {
        let mut window = started();
        window.observe(dec!(100000), t0()).unwrap();
        window.mark_completed().unwrap();
        assert!(matches!(window.mark_completed(), Err(Error::InvalidTransition(_))));

        let mut window = started();
        window.mark_expired().unwrap();
        assert!(matches!(window.mark_expired(), Err(Error::InvalidTransition(_))));
        assert!(matches!(window.mark_completed(), Err(Error::InvalidTransition(_))));
    }

    #[test]
    fn test_new_window_is_independent() {
        let mut first = started();
        first.mark_expired().unwrap();

        let later = t0() + Duration::hours(4);
        let mut second = WithdrawalWindow::new();
        second.start(dec!(100000), Duration::hours(3), later).unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(second.deadline(), Some(later + Duration::hours(3)));
        assert_eq!(first.status(), WindowStatus::Expired);
    }

    #[test]
    fn test_snapshot_progress() {
        let mut window = started();
        let at = t0() + Duration::hours(1);
        window.observe(dec!(25000), at).unwrap();

        let snapshot = window.snapshot(at);
        assert_eq!(snapshot.elapsed_secs, 3600);
        assert_eq!(snapshot.remaining_secs, 7200);
        assert_eq!(snapshot.progress_pct, dec!(25));
    }

    #[test]
    fn test_snapshot_progress_far_past_threshold() {
        let mut window = WithdrawalWindow::new();
        window.start(dec!(0.0001), Duration::hours(3), t0()).unwrap();
        window.observe(Decimal::MAX / dec!(10), t0()).unwrap();

        let snapshot = window.snapshot(t0());
        assert_eq!(snapshot.status, WindowStatus::Triggered);
        assert_eq!(snapshot.progress_pct, dec!(100));
    }
}
