//! Deadline reminders.
//!
//! Every tick looks at tasks whose deadline falls in the next one to five
//! minutes and pushes a reminder to each owner. A successful push stamps
//! `reminder_sent_at`, which keeps the task out of every later scan. Nothing
//! else deduplicates, so a crash between the push and the stamp may repeat
//! one reminder on the next tick.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::delivery::{DeliveryError, MessageId, TaskNotifier};
use crate::models::{DueTask, ReminderWindow, TaskId};
use crate::scheduling::PeriodicJob;
use crate::storage::{StorageError, TaskStore};

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Task does not exist {0}")]
    TaskNotFound(TaskId),

    #[error("User {user} has no push token, cannot remind about task {task_id}")]
    NoPushToken { task_id: TaskId, user: String },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReminderTickReport {
    pub selected: usize,
    pub sent: usize,
    /// Owner has no push token. Left unstamped.
    pub skipped: usize,
    pub failed: usize,
    /// Delivered, but the stamp could not be written.
    pub stamp_failures: usize,
}

enum Outcome {
    Sent,
    Skipped,
    Failed,
    StampFailed,
}

pub struct ReminderEngine {
    tasks: Arc<dyn TaskStore>,
    notifier: TaskNotifier,
    send_delay: Duration,
}

impl ReminderEngine {
    pub fn new(tasks: Arc<dyn TaskStore>, notifier: TaskNotifier, send_delay: Duration) -> Self {
        Self {
            tasks,
            notifier,
            send_delay,
        }
    }

    pub async fn run_tick(&self) -> Result<ReminderTickReport, StorageError> {
        self.run_tick_at(Utc::now()).await
    }

    /// Scans the window starting at `now` and reminds every selected task.
    /// Only the initial query can fail the tick; per-task problems are counted.
    pub async fn run_tick_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ReminderTickReport, StorageError> {
        let window = ReminderWindow::starting_from(now);
        let due_tasks = self.tasks.find_due_for_reminder(&window).await?;

        let mut report = ReminderTickReport {
            selected: due_tasks.len(),
            ..Default::default()
        };
        if due_tasks.is_empty() {
            return Ok(report);
        }

        log::info!(
            "[REMINDER] Found {} tasks needing deadline reminders",
            due_tasks.len()
        );

        for due in &due_tasks {
            match self.remind(due).await {
                Outcome::Skipped => {
                    report.skipped += 1;
                    continue;
                }
                Outcome::Sent => report.sent += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::StampFailed => report.stamp_failures += 1,
            }

            if !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
        }

        log::info!(
            "[REMINDER] Batch completed: {} sent, {} failed, {} skipped, {} unstamped",
            report.sent,
            report.failed,
            report.skipped,
            report.stamp_failures
        );

        Ok(report)
    }

    async fn remind(&self, due: &DueTask) -> Outcome {
        let task = &due.task;
        if due.owner.notification_target().is_none() {
            log::warn!(
                "[REMINDER] User has no push token, skipping. [user = {}, task_id = {}]",
                due.owner.email,
                task.id
            );
            return Outcome::Skipped;
        }

        if let Err(e) = self.notifier.send_task_reminder(due).await {
            log::error!(
                "[REMINDER] Failed to send reminder. [task_id = {}, user = {}, error = {}]",
                task.id,
                due.owner.email,
                e
            );
            return Outcome::Failed;
        }

        if let Err(e) = self.tasks.mark_reminded(task.id, Utc::now()).await {
            log::error!(
                "[REMINDER] Reminder sent but not recorded, it may be sent again. \
                 [task_id = {}, error = {}]",
                task.id,
                e
            );
            return Outcome::StampFailed;
        }

        log::info!(
            "[REMINDER] Reminder sent. [task_id = {}, title = '{}', user = {}, category = {}]",
            task.id,
            task.title,
            due.owner.email,
            due.category.name
        );
        Outcome::Sent
    }

    /// Sends a reminder for one task right away, ignoring the window.
    ///
    /// Does not look at or write `reminder_sent_at`: calling it twice sends twice.
    pub async fn send_immediate_reminder(
        &self,
        task_id: TaskId,
    ) -> Result<MessageId, ReminderError> {
        let due = self
            .tasks
            .get_with_owner(task_id)
            .await?
            .ok_or(ReminderError::TaskNotFound(task_id))?;

        if due.owner.notification_target().is_none() {
            return Err(ReminderError::NoPushToken {
                task_id,
                user: due.owner.email,
            });
        }

        let message_id = self.notifier.send_task_reminder(&due).await?;
        log::info!(
            "[REMINDER] Immediate reminder sent. [task_id = {task_id}, message_id = {message_id}]"
        );
        Ok(message_id)
    }
}

#[async_trait]
impl PeriodicJob for ReminderEngine {
    fn name(&self) -> &'static str {
        "task_reminders"
    }

    async fn run(&self) {
        if let Err(e) = self.run_tick().await {
            log::error!("[REMINDER] Error fetching tasks for reminders: {e}");
        }
    }
}
