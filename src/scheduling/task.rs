//! Cancellable background tasks
//!
//! Every recurring job runs as its own tokio task and is owned through a
//! [`TaskHandle`]. Cancelling the handle stops the timer loop; work already
//! spawned by a tick runs to completion.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to a running background task
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Wrap an already spawned task
    pub fn new(name: impl Into<String>, token: CancellationToken, join: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            token,
            join,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cancellation without waiting
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel and wait for the task loop to exit
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            if e.is_panic() {
                warn!("Task {} panicked during shutdown: {}", self.name, e);
            }
        }
        debug!("Task {} stopped", self.name);
    }
}

/// Spawn a periodic job.
///
/// The first tick fires after `first_delay`, then every `period`. Each tick
/// is spawned as an independent task so a long-running tick never delays
/// the timer; callers resolve overlap with an [`super::OverlapGuard`].
pub fn spawn_periodic<F, Fut>(
    name: impl Into<String>,
    period: Duration,
    first_delay: Duration,
    token: CancellationToken,
    mut tick: F,
) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    let loop_name = name.clone();
    let loop_token = token.clone();

    let join = tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + first_delay, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Task {} scheduled (period: {}s, first tick in {}s)",
            loop_name,
            period.as_secs(),
            first_delay.as_secs()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!("Task {} tick", loop_name);
                    tokio::spawn(tick());
                }
                _ = loop_token.cancelled() => {
                    info!("Task {} cancelled", loop_name);
                    break;
                }
            }
        }
    });

    TaskHandle::new(name, token, join)
}

/// Delay from `now` until the next UTC multiple of `period`.
///
/// A 6h period lands on 00:00, 06:00, 12:00 and 18:00 UTC. Exactly on a
/// boundary yields a full period.
pub fn delay_until_aligned(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis() as i64;
    if period_ms == 0 {
        return Duration::ZERO;
    }

    let into_period = now.timestamp_millis().rem_euclid(period_ms);
    Duration::from_millis((period_ms - into_period) as u64)
}
