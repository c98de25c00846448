use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};

use super::user::UserId;

pub type TaskId = i64;
pub type CategoryId = i64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown task status {0}")]
pub struct UnknownTaskStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownTaskStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(UnknownTaskStatus(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Whether this task should be picked up by a reminder scan over `window`.
    ///
    /// Storage backends that filter in their query language must agree with this.
    pub fn is_due_for_reminder(&self, window: &ReminderWindow) -> bool {
        self.deleted_at.is_none()
            && self.reminder_sent_at.is_none()
            && self.status != TaskStatus::Done
            && self.deadline.is_some_and(|deadline| window.contains(deadline))
    }
}

const WINDOW_START_OFFSET: Duration = Duration::minutes(1);
const WINDOW_END_OFFSET: Duration = Duration::minutes(5);

/// Half-open `[start, end)` range of deadlines eligible for a reminder.
///
/// Four minutes wide while the scan runs every minute, so a task stays eligible
/// across a skipped tick until it is reminded or its deadline leaves the range.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReminderWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ReminderWindow {
    pub fn starting_from(now: DateTime<Utc>) -> Self {
        Self {
            start: now + WINDOW_START_OFFSET,
            end: now + WINDOW_END_OFFSET,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}
