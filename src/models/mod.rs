pub mod sync_record;
pub mod task;
pub mod user;

pub use sync_record::{SyncRecord, SyncRecordId, SyncStatus};
pub use task::{Category, CategoryId, ReminderWindow, Task, TaskId, TaskStatus};
pub use user::{User, UserId};

/// A task joined with everything a reminder needs: its owner and category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTask {
    pub task: Task,
    pub owner: User,
    pub category: Category,
}
