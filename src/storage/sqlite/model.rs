use chrono::{DateTime, Utc};

use crate::models::{Category, DueTask, SyncRecord, SyncStatus, Task, TaskStatus, User};
use crate::storage::StorageError;

#[derive(sqlx::FromRow)]
pub struct DueTaskStorageModel {
    pub task_id: i64,
    pub title: String,
    pub status: String,
    pub deadline: Option<i64>,
    pub reminder_sent_at: Option<i64>,
    pub task_deleted_at: Option<i64>,
    pub user_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub fcm_token: Option<String>,
    pub category_id: i64,
    pub category_name: String,
}

impl TryFrom<DueTaskStorageModel> for DueTask {
    type Error = StorageError;

    fn try_from(value: DueTaskStorageModel) -> Result<Self, Self::Error> {
        let status = value
            .status
            .parse::<TaskStatus>()
            .map_err(|e| StorageError::InvalidRow(format!("{e} [task_id = {}]", value.task_id)))?;

        let task = Task {
            id: value.task_id,
            title: value.title,
            status,
            deadline: parse_timestamp(value.deadline)?,
            reminder_sent_at: parse_timestamp(value.reminder_sent_at)?,
            user_id: value.user_id,
            category_id: value.category_id,
            deleted_at: parse_timestamp(value.task_deleted_at)?,
        };
        let owner = User {
            id: value.user_id,
            name: value.user_name,
            email: value.user_email,
            push_token: value.fcm_token,
        };
        let category = Category {
            id: value.category_id,
            name: value.category_name,
        };

        Ok(DueTask {
            task,
            owner,
            category,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct SyncRecordStorageModel {
    pub id: i64,
    pub source: String,
    pub status: String,
    pub last_sync_at: Option<i64>,
    pub error_message: String,
    pub records_synced: i64,
}

impl From<&SyncRecord> for SyncRecordStorageModel {
    fn from(value: &SyncRecord) -> Self {
        Self {
            id: value.id,
            source: value.source.clone(),
            status: value.status.as_str().to_owned(),
            last_sync_at: value.last_sync_at.map(|at| at.timestamp_millis()),
            error_message: value.error_message.clone(),
            records_synced: i64::from(value.records_synced),
        }
    }
}

impl TryFrom<SyncRecordStorageModel> for SyncRecord {
    type Error = StorageError;

    fn try_from(value: SyncRecordStorageModel) -> Result<Self, Self::Error> {
        let status = value
            .status
            .parse::<SyncStatus>()
            .map_err(|e| StorageError::InvalidRow(format!("{e} [source = {}]", value.source)))?;
        let records_synced = u32::try_from(value.records_synced).map_err(|_| {
            StorageError::InvalidRow(format!(
                "records_synced out of range {} [source = {}]",
                value.records_synced, value.source
            ))
        })?;

        Ok(Self {
            id: value.id,
            source: value.source,
            status,
            last_sync_at: parse_timestamp(value.last_sync_at)?,
            error_message: value.error_message,
            records_synced,
        })
    }
}

fn parse_timestamp(millis: Option<i64>) -> Result<Option<DateTime<Utc>>, StorageError> {
    millis
        .map(|millis| {
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| StorageError::InvalidRow(format!("timestamp out of range {millis}")))
        })
        .transpose()
}
