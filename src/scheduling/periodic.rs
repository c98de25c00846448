use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use super::PeriodicJob;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("trigger period must be greater than zero")]
    ZeroPeriod,

    #[error("trigger period {0:?} is not a whole number of seconds")]
    FractionalPeriod(Duration),
}

/// Fires every `period`, on wall-clock multiples of the period since the unix
/// epoch: a 60 s trigger fires at second 0 of each minute, a 30 min one at
/// :00 and :30.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    period: Duration,
    run_on_start: bool,
}

impl Trigger {
    pub fn every(period: Duration) -> Result<Self, TriggerError> {
        if period.is_zero() {
            return Err(TriggerError::ZeroPeriod);
        }
        if period.subsec_nanos() != 0 {
            return Err(TriggerError::FractionalPeriod(period));
        }

        Ok(Self {
            period,
            run_on_start: false,
        })
    }

    /// Also run once as soon as the trigger starts, before the first aligned tick.
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn runs_on_start(&self) -> bool {
        self.run_on_start
    }

    /// Time from `now` to the next boundary. Never zero: a `now` that sits
    /// exactly on a boundary waits a full period. A leap second counts as the
    /// last instant of the second before it.
    pub fn delay_until_next(&self, now: DateTime<Utc>) -> Duration {
        let subsec_nanos = now.timestamp_subsec_nanos().min(999_999_999);
        let now_ms = now
            .timestamp()
            .saturating_mul(1000)
            .saturating_add(i64::from(subsec_nanos / 1_000_000));

        let period_ms = i64::try_from(self.period.as_millis()).unwrap_or(i64::MAX);
        let into_period = now_ms.rem_euclid(period_ms);
        let delay_ms = u64::try_from(period_ms - into_period).unwrap_or(0);

        Duration::from_millis(delay_ms)
            .saturating_sub(Duration::from_nanos(u64::from(subsec_nanos % 1_000_000)))
    }
}

/// First tick strictly after `after`, on the grid `anchor + k * period`.
fn next_fire_after(anchor: Instant, period: Duration, after: Instant) -> Instant {
    if after < anchor {
        return anchor;
    }

    let periods = (after - anchor).as_nanos() / period.as_nanos() + 1;
    anchor + period.saturating_mul(u32::try_from(periods).unwrap_or(u32::MAX))
}

/// A job running on a trigger in its own tokio task.
pub struct PeriodicTask {
    name: &'static str,
    task_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl PeriodicTask {
    pub fn spawn(job: Arc<dyn PeriodicJob>, trigger: Trigger) -> Self {
        let first_fire = Instant::now() + trigger.delay_until_next(Utc::now());
        Self::spawn_anchored(job, trigger, first_fire)
    }

    fn spawn_anchored(job: Arc<dyn PeriodicJob>, trigger: Trigger, first_fire: Instant) -> Self {
        let cancellation_token = CancellationToken::new();
        let task_cancellation_token = cancellation_token.child_token();
        let name = job.name();

        let task_handle = tokio::spawn(async move {
            Self::run_on_trigger(task_cancellation_token, job, trigger, first_fire).await;
        });

        Self {
            name,
            task_handle,
            cancellation_token,
        }
    }

    /// Runs are awaited inline, so a job never overlaps itself. Ticks that
    /// pass while a run is in flight are dropped.
    async fn run_on_trigger(
        cancellation_token: CancellationToken,
        job: Arc<dyn PeriodicJob>,
        trigger: Trigger,
        anchor: Instant,
    ) {
        if trigger.run_on_start && !cancellation_token.is_cancelled() {
            log::debug!("[SCHEDULER] Initial run. [job = {}]", job.name());
            job.run().await;
        }

        loop {
            let next_fire = next_fire_after(anchor, trigger.period, Instant::now());

            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => {
                    log::debug!("[SCHEDULER] Trigger cancelled. [job = {}]", job.name());
                    break;
                },
                _ = time::sleep_until(next_fire) => {
                    log::debug!("[SCHEDULER] Tick. [job = {}]", job.name());
                    job.run().await;
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops further ticks. A run already in flight keeps going.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Waits up to `timeout` for the task to finish after [`Self::cancel`].
    /// Returns `false` if the in-flight run had to be aborted.
    pub async fn join(mut self, timeout: Duration) -> bool {
        match time::timeout(timeout, &mut self.task_handle).await {
            Ok(_) => true,
            Err(_) => {
                self.task_handle.abort();
                false
            }
        }
    }

    pub async fn stop(self, timeout: Duration) -> bool {
        self.cancel();
        self.join(timeout).await
    }
}
