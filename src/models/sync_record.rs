use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};

pub type SyncRecordId = i64;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown sync status {0}")]
pub struct UnknownSyncStatus(pub String);

impl FromStr for SyncStatus {
    type Err = UnknownSyncStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(UnknownSyncStatus(other.to_owned())),
        }
    }
}

/// Bookkeeping for one named external data source, e.g. `"weather"`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub id: SyncRecordId,
    pub source: String,
    pub status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub error_message: String,
    pub records_synced: u32,
}

impl SyncRecord {
    pub fn new(id: SyncRecordId, source: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
            status: SyncStatus::Pending,
            last_sync_at: None,
            error_message: String::new(),
            records_synced: 0,
        }
    }

    /// A run has started. Previous counters and `last_sync_at` are kept.
    pub fn mark_pending(&mut self) {
        self.status = SyncStatus::Pending;
        self.error_message.clear();
    }

    pub fn mark_failed(&mut self, error: impl fmt::Display) {
        self.status = SyncStatus::Failed;
        self.error_message = error.to_string();
    }

    pub fn mark_succeeded(&mut self, at: DateTime<Utc>, records_synced: u32) {
        self.status = SyncStatus::Success;
        self.last_sync_at = Some(at);
        self.error_message.clear();
        self.records_synced = records_synced;
    }
}
