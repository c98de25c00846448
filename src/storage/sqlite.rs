mod model;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{DueTaskStorageModel, SyncRecordStorageModel};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::models::{DueTask, ReminderWindow, SyncRecord, TaskId};

use super::{StorageError, SyncRecordStore, TaskStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    fcm_token TEXT,
    deleted_at INTEGER
);
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'todo' CHECK (status IN ('todo', 'in_progress', 'done')),
    user_id INTEGER NOT NULL REFERENCES users (id),
    category_id INTEGER NOT NULL REFERENCES categories (id),
    deadline INTEGER,
    reminder_sent_at INTEGER,
    deleted_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_tasks_deadline ON tasks (deadline);
CREATE TABLE IF NOT EXISTS external_data_syncs (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL UNIQUE,
    last_sync_at INTEGER,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'success', 'failed')),
    error_message TEXT NOT NULL DEFAULT '',
    records_synced INTEGER NOT NULL DEFAULT 0
);
";

const DUE_TASK_COLUMNS: &str = "
SELECT t.id AS task_id,
       t.title,
       t.status,
       t.deadline,
       t.reminder_sent_at,
       t.deleted_at AS task_deleted_at,
       u.id AS user_id,
       u.name AS user_name,
       u.email AS user_email,
       u.fcm_token,
       c.id AS category_id,
       c.name AS category_name
FROM tasks t
JOIN users u ON u.id = t.user_id AND u.deleted_at IS NULL
JOIN categories c ON c.id = t.category_id
";

/// Timestamps are kept as unix milliseconds so window filters compare numbers.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    /// A private in-memory database. Limited to one connection, since every
    /// sqlite memory connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self::new(pool))
    }

    /// Creates missing tables. Existing tables are left untouched.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn find_due_for_reminder(
        &self,
        window: &ReminderWindow,
    ) -> Result<Vec<DueTask>, StorageError> {
        let query = format!(
            "{DUE_TASK_COLUMNS}
WHERE t.deadline IS NOT NULL
  AND t.deadline >= ?
  AND t.deadline < ?
  AND t.reminder_sent_at IS NULL
  AND t.status != 'done'
  AND t.deleted_at IS NULL
ORDER BY t.id"
        );
        let rows = sqlx::query_as::<_, DueTaskStorageModel>(&query)
            .bind(window.start().timestamp_millis())
            .bind(window.end().timestamp_millis())
            .fetch_all(&self.pool)
            .await?;

        let due_tasks = rows
            .into_iter()
            .filter_map(|row| match DueTask::try_from(row) {
                Ok(due_task) => Some(due_task),
                Err(e) => {
                    log::warn!("Task row could not be read, ignoring. [error = {e}]");
                    None
                }
            })
            .collect();

        Ok(due_tasks)
    }

    async fn get_with_owner(&self, id: TaskId) -> Result<Option<DueTask>, StorageError> {
        let query = format!("{DUE_TASK_COLUMNS} WHERE t.id = ? AND t.deleted_at IS NULL");
        let row = sqlx::query_as::<_, DueTaskStorageModel>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn mark_reminded(&self, id: TaskId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE tasks SET reminder_sent_at = ? WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::TaskNotFound(id));
        }

        Ok(())
    }
}

#[async_trait]
impl SyncRecordStore for SqliteStore {
    async fn find_or_create(&self, source: &str) -> Result<SyncRecord, StorageError> {
        sqlx::query(
            "INSERT INTO external_data_syncs (source) VALUES (?) ON CONFLICT (source) DO NOTHING",
        )
        .bind(source)
        .execute(&self.pool)
        .await?;

        let record = sqlx::query_as::<_, SyncRecordStorageModel>(
            "SELECT id, source, status, last_sync_at, error_message, records_synced
FROM external_data_syncs
WHERE source = ?",
        )
        .bind(source)
        .fetch_one(&self.pool)
        .await?;

        record.try_into()
    }

    async fn save(&self, record: &SyncRecord) -> Result<(), StorageError> {
        let SyncRecordStorageModel {
            id,
            source: _,
            status,
            last_sync_at,
            error_message,
            records_synced,
        } = record.into();

        sqlx::query(
            "
UPDATE external_data_syncs
SET status = ?,
    last_sync_at = ?,
    error_message = ?,
    records_synced = ?
WHERE id = ?
",
        )
        .bind(status)
        .bind(last_sync_at)
        .bind(error_message)
        .bind(records_synced)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::{SyncStatus, TaskStatus};

    async fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.ensure_schema().await.unwrap();

        sqlx::query(
            "INSERT INTO users (id, name, email, fcm_token)
VALUES (1, 'Sari', 'sari@example.com', 'token-1')",
        )
        .execute(store.pool())
        .await
        .unwrap();
        sqlx::query("INSERT INTO categories (id, name) VALUES (1, 'Work')")
            .execute(store.pool())
            .await
            .unwrap();

        store
    }

    async fn insert_task(store: &SqliteStore, id: i64, status: &str, deadline: DateTime<Utc>) {
        sqlx::query(
            "INSERT INTO tasks (id, title, status, user_id, category_id, deadline)
VALUES (?, ?, ?, 1, 1, ?)",
        )
        .bind(id)
        .bind(format!("Task {id}"))
        .bind(status)
        .bind(deadline.timestamp_millis())
        .execute(store.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn selects_only_eligible_tasks() {
        let store = store().await;
        let now = Utc::now();

        insert_task(&store, 1, "todo", now + Duration::minutes(3)).await;
        insert_task(&store, 2, "done", now + Duration::minutes(3)).await;
        insert_task(&store, 3, "in_progress", now + Duration::minutes(10)).await;
        insert_task(&store, 4, "in_progress", now + Duration::minutes(1)).await;
        insert_task(&store, 5, "todo", now + Duration::minutes(5)).await;
        insert_task(&store, 6, "todo", now + Duration::minutes(2)).await;
        sqlx::query("UPDATE tasks SET deleted_at = ? WHERE id = 6")
            .bind(now.timestamp_millis())
            .execute(store.pool())
            .await
            .unwrap();

        let due = store
            .find_due_for_reminder(&ReminderWindow::starting_from(now))
            .await
            .unwrap();
        let ids: Vec<_> = due.iter().map(|due| due.task.id).collect();

        assert_eq!(ids, vec![1, 4]);
        assert_eq!(due[0].task.status, TaskStatus::Todo);
        assert_eq!(due[0].owner.notification_target(), Some("token-1"));
        assert_eq!(due[0].category.name, "Work");
    }

    #[tokio::test]
    async fn unreadable_row_does_not_hide_the_others() {
        let store = store().await;
        let now = Utc::now();
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(store.pool())
            .await
            .unwrap();

        insert_task(&store, 1, "archived", now + Duration::minutes(2)).await;
        insert_task(&store, 2, "todo", now + Duration::minutes(3)).await;

        let due = store
            .find_due_for_reminder(&ReminderWindow::starting_from(now))
            .await
            .unwrap();
        let ids: Vec<_> = due.iter().map(|due| due.task.id).collect();

        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn tasks_of_deleted_users_are_not_selected() {
        let store = store().await;
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, name, email, fcm_token, deleted_at)
VALUES (2, 'Budi', 'budi@example.com', 'token-2', ?)",
        )
        .bind(now.timestamp_millis())
        .execute(store.pool())
        .await
        .unwrap();
        insert_task(&store, 1, "todo", now + Duration::minutes(3)).await;
        insert_task(&store, 2, "todo", now + Duration::minutes(3)).await;
        sqlx::query("UPDATE tasks SET user_id = 2 WHERE id = 2")
            .execute(store.pool())
            .await
            .unwrap();

        let due = store
            .find_due_for_reminder(&ReminderWindow::starting_from(now))
            .await
            .unwrap();
        let ids: Vec<_> = due.iter().map(|due| due.task.id).collect();

        assert_eq!(ids, vec![1]);
        assert!(store.get_with_owner(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stamped_tasks_are_not_selected_again() {
        let store = store().await;
        let now = Utc::now();
        insert_task(&store, 1, "todo", now + Duration::minutes(3)).await;

        store.mark_reminded(1, now).await.unwrap();

        let window = ReminderWindow::starting_from(now);
        assert!(store.find_due_for_reminder(&window).await.unwrap().is_empty());

        let task = store.get_with_owner(1).await.unwrap().unwrap().task;
        assert_eq!(
            task.reminder_sent_at.map(|at| at.timestamp_millis()),
            Some(now.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn marking_unknown_task_fails() {
        let store = store().await;
        let result = store.mark_reminded(99, Utc::now()).await;
        assert!(matches!(result, Err(StorageError::TaskNotFound(99))));
    }

    #[tokio::test]
    async fn sync_record_round_trips_through_the_table() {
        let store = store().await;

        let mut record = store.find_or_create("weather").await.unwrap();
        assert_eq!(record.status, SyncStatus::Pending);

        let at = Utc::now();
        record.mark_succeeded(at, 5);
        store.save(&record).await.unwrap();

        let reloaded = store.find_or_create("weather").await.unwrap();
        assert_eq!(reloaded.id, record.id);
        assert_eq!(reloaded.status, SyncStatus::Success);
        assert_eq!(reloaded.records_synced, 5);
        assert_eq!(
            reloaded.last_sync_at.map(|at| at.timestamp_millis()),
            Some(at.timestamp_millis())
        );
    }
}
