use std::{fmt, sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::appsettings::SchedulerSettings;

use super::{PeriodicJob, PeriodicTask, Trigger, TriggerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerState {
    Stopped,
    Running,
    Failed(String),
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerState::Stopped => f.write_str("stopped"),
            TriggerState::Running => f.write_str("running"),
            TriggerState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

struct Registration {
    job: Arc<dyn PeriodicJob>,
    trigger: Result<Trigger, TriggerError>,
    task: Option<PeriodicTask>,
}

impl Registration {
    fn state(&self) -> TriggerState {
        match (&self.trigger, &self.task) {
            (Err(e), _) => TriggerState::Failed(e.to_string()),
            (Ok(_), Some(_)) => TriggerState::Running,
            (Ok(_), None) => TriggerState::Stopped,
        }
    }
}

/// Owns the periodic jobs of the process and their lifecycle.
pub struct SchedulerDriver {
    registrations: Vec<Registration>,
    drain_timeout: Duration,
}

impl SchedulerDriver {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            registrations: Vec::new(),
            drain_timeout,
        }
    }

    /// The reminder scan every `reminder_period_secs` and the data sync every
    /// `sync_period_secs`, optionally with one sync right after start.
    pub fn from_settings(
        settings: &SchedulerSettings,
        reminders: Arc<dyn PeriodicJob>,
        sync: Arc<dyn PeriodicJob>,
    ) -> Self {
        let mut driver = Self::new(settings.drain_timeout());
        let registrations = [
            (reminders, settings.reminder_period_secs, false),
            (sync, settings.sync_period_secs, settings.sync_on_start),
        ];
        for (job, period_secs, run_on_start) in registrations {
            // Already logged, and reported through `status` as `Failed`.
            if let Err(e) = driver.register(job, Duration::from_secs(period_secs), run_on_start) {
                log::debug!("[SCHEDULER] Continuing without job. [error = {e}]");
            }
        }
        driver
    }

    /// Adds a job. An invalid period leaves the job registered in the
    /// `Failed` state; it never starts, and other jobs are unaffected.
    pub fn register(
        &mut self,
        job: Arc<dyn PeriodicJob>,
        period: Duration,
        run_on_start: bool,
    ) -> Result<(), TriggerError> {
        let trigger = Trigger::every(period).map(|t| t.with_run_on_start(run_on_start));
        if let Err(e) = &trigger {
            log::error!(
                "[SCHEDULER] Could not register job. [job = {}, error = {}]",
                job.name(),
                e
            );
        }

        let result = trigger.as_ref().map(|_| ()).map_err(Clone::clone);
        self.registrations.push(Registration {
            job,
            trigger,
            task: None,
        });
        result
    }

    /// Starts every stopped job with a valid trigger. Calling it again is a no-op.
    pub fn start(&mut self) {
        for registration in &mut self.registrations {
            let Ok(trigger) = &registration.trigger else {
                continue;
            };
            let trigger = *trigger;
            if registration.task.is_some() {
                continue;
            }

            log::info!(
                "[SCHEDULER] Starting job. [job = {}, period = {:?}, run_on_start = {}]",
                registration.job.name(),
                trigger.period(),
                trigger.runs_on_start()
            );
            registration.task = Some(PeriodicTask::spawn(registration.job.clone(), trigger));
        }
    }

    /// Cancels every running job, then waits for in-flight runs. All of them
    /// share one drain timeout. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        let tasks: Vec<PeriodicTask> = self
            .registrations
            .iter_mut()
            .filter_map(|registration| registration.task.take())
            .collect();
        for task in &tasks {
            task.cancel();
        }

        let deadline = Instant::now() + self.drain_timeout;
        for task in tasks {
            let name = task.name();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if task.join(remaining).await {
                log::info!("[SCHEDULER] Job stopped. [job = {name}]");
            } else {
                log::warn!(
                    "[SCHEDULER] Job did not finish within {:?}, aborted. [job = {name}]",
                    self.drain_timeout
                );
            }
        }
    }

    pub fn status(&self) -> Vec<(&'static str, TriggerState)> {
        self.registrations
            .iter()
            .map(|registration| (registration.job.name(), registration.state()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;

    struct NamedJob {
        name: &'static str,
        runs: AtomicUsize,
        run_time: Duration,
    }

    impl NamedJob {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
                run_time: Duration::ZERO,
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PeriodicJob for NamedJob {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self) {
            if !self.run_time.is_zero() {
                tokio::time::sleep(self.run_time).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn settings() -> SchedulerSettings {
        SchedulerSettings::default()
    }

    fn delay_until_next(period_secs: u64) -> Duration {
        Trigger::every(Duration::from_secs(period_secs))
            .unwrap()
            .delay_until_next(Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn reminders_tick_every_minute_and_sync_runs_eagerly() {
        let reminders = NamedJob::new("task_reminders");
        let sync = NamedJob::new("weather_sync");
        let mut driver = SchedulerDriver::from_settings(
            &settings(),
            reminders.clone(),
            sync.clone(),
        );
        let first_minute = delay_until_next(60);

        driver.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sync.runs(), 1);

        tokio::time::sleep(first_minute + Duration::from_secs(120)).await;
        assert!(reminders.runs() >= 3);
        assert_eq!(
            driver.status(),
            vec![
                ("task_reminders", TriggerState::Running),
                ("weather_sync", TriggerState::Running)
            ]
        );

        driver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn eager_sync_can_be_disabled() {
        let sync = NamedJob::new("weather_sync");
        let settings = SchedulerSettings {
            sync_on_start: false,
            ..settings()
        };
        let mut driver = SchedulerDriver::from_settings(
            &settings,
            NamedJob::new("task_reminders"),
            sync.clone(),
        );

        driver.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sync.runs(), 0);
        driver.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_driver_does_not_tick() {
        let reminders = NamedJob::new("task_reminders");
        let mut driver = SchedulerDriver::from_settings(
            &settings(),
            reminders.clone(),
            NamedJob::new("weather_sync"),
        );

        driver.start();
        tokio::time::sleep(delay_until_next(60) + Duration::from_secs(1)).await;
        driver.stop().await;
        let runs = reminders.runs();

        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(reminders.runs(), runs);
        assert!(driver
            .status()
            .iter()
            .all(|(_, state)| *state == TriggerState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let sync = NamedJob::new("weather_sync");
        let mut driver = SchedulerDriver::from_settings(
            &settings(),
            NamedJob::new("task_reminders"),
            sync.clone(),
        );

        driver.start();
        driver.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sync.runs(), 1);

        driver.stop().await;
        driver.stop().await;
        assert!(driver
            .status()
            .iter()
            .all(|(_, state)| *state == TriggerState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_in_flight_run() {
        let sync = Arc::new(NamedJob {
            name: "weather_sync",
            runs: AtomicUsize::new(0),
            run_time: Duration::from_secs(10),
        });
        let mut driver = SchedulerDriver::from_settings(
            &settings(),
            NamedJob::new("task_reminders"),
            sync.clone(),
        );

        driver.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sync.runs(), 0);

        driver.stop().await;

        assert_eq!(sync.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_job_ticks_while_another_drains() {
        let slow = Arc::new(NamedJob {
            name: "slow",
            runs: AtomicUsize::new(0),
            run_time: Duration::from_secs(90),
        });
        let fast = NamedJob::new("fast");
        let mut driver = SchedulerDriver::new(Duration::from_secs(120));
        driver
            .register(slow.clone(), Duration::from_secs(60), true)
            .unwrap();
        driver
            .register(fast.clone(), Duration::from_secs(60), false)
            .unwrap();

        driver.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let fast_runs = fast.runs();

        // The slow run drains for another 89 s, past at least one minute boundary.
        driver.stop().await;

        assert_eq!(slow.runs(), 1);
        assert_eq!(fast.runs(), fast_runs);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_is_shared_by_all_jobs() {
        let first = Arc::new(NamedJob {
            name: "first",
            runs: AtomicUsize::new(0),
            run_time: Duration::from_secs(100),
        });
        let second = Arc::new(NamedJob {
            name: "second",
            runs: AtomicUsize::new(0),
            run_time: Duration::from_secs(100),
        });
        let mut driver = SchedulerDriver::new(Duration::from_secs(30));
        driver
            .register(first.clone(), Duration::from_secs(3600), true)
            .unwrap();
        driver
            .register(second.clone(), Duration::from_secs(3600), true)
            .unwrap();

        driver.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let stopping = tokio::time::Instant::now();
        driver.stop().await;

        assert!(stopping.elapsed() <= Duration::from_secs(31));
        assert_eq!(first.runs() + second.runs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_trigger_fails_without_blocking_the_other() {
        let reminders = NamedJob::new("task_reminders");
        let sync = NamedJob::new("weather_sync");
        let settings = SchedulerSettings {
            reminder_period_secs: 0,
            ..settings()
        };
        let mut driver = SchedulerDriver::from_settings(&settings, reminders.clone(), sync.clone());

        driver.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = driver.status();
        assert!(matches!(status[0].1, TriggerState::Failed(_)));
        assert_eq!(status[1].1, TriggerState::Running);
        assert_eq!(sync.runs(), 1);

        driver.stop().await;
        assert!(matches!(driver.status()[0].1, TriggerState::Failed(_)));
    }

    #[test]
    fn fractional_period_is_reported() {
        let mut driver = SchedulerDriver::new(Duration::from_secs(30));

        let result = driver.register(NamedJob::new("fast"), Duration::from_millis(500), false);

        assert!(matches!(result, Err(TriggerError::FractionalPeriod(_))));
        assert_eq!(
            driver.status(),
            vec![(
                "fast",
                TriggerState::Failed(
                    "trigger period 500ms is not a whole number of seconds".to_owned()
                )
            )]
        );
    }
}
