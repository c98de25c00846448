mod memory;
pub mod sqlite;

pub use memory::{InMemoryStore, NewTask, NewUser};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{DueTask, ReminderWindow, SyncRecord, TaskId};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("Task does not exist {0}")]
    TaskNotFound(TaskId),

    #[error("Stored row is invalid: {0}")]
    InvalidRow(String),
}

/// Read/write access to tasks, as far as reminder scans need it.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Tasks whose deadline lies inside `window`, that were not reminded yet,
    /// are not done and are not deleted. Loaded with owner and category.
    async fn find_due_for_reminder(
        &self,
        window: &ReminderWindow,
    ) -> Result<Vec<DueTask>, StorageError>;

    async fn get_with_owner(&self, id: TaskId) -> Result<Option<DueTask>, StorageError>;

    /// Sets `reminder_sent_at`. The only writer of the dedup stamp.
    async fn mark_reminded(&self, id: TaskId, at: DateTime<Utc>) -> Result<(), StorageError>;
}

#[async_trait]
pub trait SyncRecordStore: Send + Sync + 'static {
    /// Returns the live record for `source`, creating a pending one on first use.
    async fn find_or_create(&self, source: &str) -> Result<SyncRecord, StorageError>;

    async fn save(&self, record: &SyncRecord) -> Result<(), StorageError>;
}
