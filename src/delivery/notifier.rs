use std::{collections::BTreeMap, sync::Arc};

use crate::models::{DueTask, Task, TaskStatus, User};

use super::{
    AndroidOptions, DeliveryError, MAX_BATCH_SIZE, MessageId, MessagePriority,
    NotificationSender, PushMessage,
};

const REMINDER_TITLE: &str = "⏰ Task Reminder - TaskFlow";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkSummary {
    pub batches: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Tasks left out because their owner has no push token.
    pub skipped: usize,
}

/// Turns task events into push messages and hands them to a sender.
#[derive(Clone)]
pub struct TaskNotifier {
    sender: Arc<dyn NotificationSender>,
}

impl TaskNotifier {
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    pub async fn send_task_reminder(&self, due: &DueTask) -> Result<MessageId, DeliveryError> {
        let token = due
            .owner
            .notification_target()
            .ok_or_else(|| DeliveryError::MissingToken(due.owner.email.clone()))?;

        self.sender
            .send(&reminder_message(&due.task, token))
            .await
    }

    /// Tells the owner a task changed status. Owners without a token are skipped.
    pub async fn send_status_update(
        &self,
        task: &Task,
        owner: &User,
        new_status: TaskStatus,
    ) -> Result<Option<MessageId>, DeliveryError> {
        let Some(token) = owner.notification_target() else {
            log::warn!(
                "User has no push token, skipping status notification. [user = {}, task_id = {}]",
                owner.email,
                task.id
            );
            return Ok(None);
        };

        let message_id = self
            .sender
            .send(&status_update_message(task, token, new_status))
            .await?;
        Ok(Some(message_id))
    }

    /// Sends reminders for many tasks at once, in provider-sized batches.
    /// A failed batch is counted and the remaining batches still go out.
    pub async fn send_bulk_reminders(&self, tasks: &[DueTask]) -> BulkSummary {
        let mut summary = BulkSummary::default();
        let messages: Vec<PushMessage> = tasks
            .iter()
            .filter_map(|due| match due.owner.notification_target() {
                Some(token) => Some(reminder_message(&due.task, token)),
                None => {
                    summary.skipped += 1;
                    None
                }
            })
            .collect();

        if messages.is_empty() {
            log::info!("No valid push tokens found for bulk reminders");
            return summary;
        }

        for batch in messages.chunks(MAX_BATCH_SIZE) {
            summary.batches += 1;
            match self.sender.send_each(batch).await {
                Ok(response) => {
                    log::info!(
                        "Bulk reminders sent: {} success, {} failed",
                        response.success_count,
                        response.failure_count
                    );
                    summary.success_count += response.success_count;
                    summary.failure_count += response.failure_count;
                }
                Err(e) => {
                    log::error!("Error sending bulk reminder batch of {}: {e}", batch.len());
                    summary.failure_count += batch.len();
                }
            }
        }

        summary
    }
}

fn task_data(task: &Task, kind: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("task_id".to_owned(), task.id.to_string()),
        ("task_title".to_owned(), task.title.clone()),
        ("user_id".to_owned(), task.user_id.to_string()),
        ("category_id".to_owned(), task.category_id.to_string()),
        ("type".to_owned(), kind.to_owned()),
        ("action".to_owned(), "open_task".to_owned()),
    ])
}

pub(crate) fn reminder_message(task: &Task, token: &str) -> PushMessage {
    PushMessage {
        token: token.to_owned(),
        title: REMINDER_TITLE.to_owned(),
        body: format!("Don't forget: {} is due in 5 minutes!", task.title),
        data: task_data(task, "task_reminder"),
        android: Some(AndroidOptions {
            channel_id: "task_reminders".to_owned(),
            color: "#3B82F6".to_owned(),
            priority: MessagePriority::High,
        }),
        apns_badge: Some(1),
    }
}

fn status_update_message(task: &Task, token: &str, new_status: TaskStatus) -> PushMessage {
    let (icon, text) = match new_status {
        TaskStatus::InProgress => ("🚀", "🚀 Task has been started"),
        TaskStatus::Done => ("✅", "✅ Task has been completed"),
        TaskStatus::Todo => ("📋", "📋 Task has been reset to todo"),
    };

    let mut data = task_data(task, "status_update");
    data.insert("new_status".to_owned(), new_status.to_string());

    PushMessage {
        token: token.to_owned(),
        title: format!("{icon} Task Updated"),
        body: format!("{}: {text}", task.title),
        data,
        android: Some(AndroidOptions {
            channel_id: "task_updates".to_owned(),
            color: "#10B981".to_owned(),
            priority: MessagePriority::Default,
        }),
        apns_badge: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::delivery::test_utils::RecordingSender;
    use crate::models::Category;

    fn due_task(id: i64, push_token: Option<&str>) -> DueTask {
        DueTask {
            task: Task {
                id,
                title: format!("Task {id}"),
                status: TaskStatus::Todo,
                deadline: Some(Utc::now() + Duration::minutes(3)),
                reminder_sent_at: None,
                user_id: 100 + id,
                category_id: 3,
                deleted_at: None,
            },
            owner: User {
                id: 100 + id,
                name: format!("User {id}"),
                email: format!("user{id}@example.com"),
                push_token: push_token.map(str::to_owned),
            },
            category: Category {
                id: 3,
                name: "Personal".to_owned(),
            },
        }
    }

    #[test]
    fn reminder_payload_is_keyed_by_task_user_and_category() {
        let due = due_task(12, Some("token"));
        let message = reminder_message(&due.task, "token");

        assert_eq!(message.data["task_id"], "12");
        assert_eq!(message.data["task_title"], "Task 12");
        assert_eq!(message.data["user_id"], "112");
        assert_eq!(message.data["category_id"], "3");
        assert_eq!(message.data["type"], "task_reminder");
        assert_eq!(message.body, "Don't forget: Task 12 is due in 5 minutes!");
    }

    #[tokio::test]
    async fn reminder_without_token_is_not_sent() {
        let sender = RecordingSender::default();
        let notifier = TaskNotifier::new(Arc::new(sender.clone()));

        let result = notifier.send_task_reminder(&due_task(1, Some(" "))).await;

        assert!(matches!(result, Err(DeliveryError::MissingToken(_))));
        assert_eq!(sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn status_update_carries_new_status() {
        let sender = RecordingSender::default();
        let notifier = TaskNotifier::new(Arc::new(sender.clone()));
        let due = due_task(5, Some("token"));

        let sent = notifier
            .send_status_update(&due.task, &due.owner, TaskStatus::Done)
            .await
            .unwrap();

        assert!(sent.is_some());
        let messages = sender.sent.lock().unwrap();
        assert_eq!(messages[0].data["new_status"], "done");
        assert_eq!(messages[0].title, "✅ Task Updated");
    }

    #[tokio::test]
    async fn status_update_without_token_is_a_no_op() {
        let sender = RecordingSender::default();
        let notifier = TaskNotifier::new(Arc::new(sender.clone()));
        let due = due_task(5, None);

        let sent = notifier
            .send_status_update(&due.task, &due.owner, TaskStatus::InProgress)
            .await
            .unwrap();

        assert!(sent.is_none());
        assert_eq!(sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn bulk_reminders_are_chunked_to_provider_limit() {
        let sender = RecordingSender::default();
        let notifier = TaskNotifier::new(Arc::new(sender.clone()));
        let mut tasks: Vec<DueTask> = (1..=1001).map(|id| due_task(id, Some("token"))).collect();
        tasks.push(due_task(2000, None));

        let summary = notifier.send_bulk_reminders(&tasks).await;

        assert_eq!(*sender.batch_calls.lock().unwrap(), vec![500, 500, 1]);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.success_count, 1001);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn bulk_failures_are_counted_per_message() {
        let sender = RecordingSender::default();
        sender.fail_for_task(2);
        let notifier = TaskNotifier::new(Arc::new(sender.clone()));
        let tasks: Vec<DueTask> = (1..=3).map(|id| due_task(id, Some("token"))).collect();

        let summary = notifier.send_bulk_reminders(&tasks).await;

        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 1);
    }
}
