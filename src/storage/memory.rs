use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{
    Category, CategoryId, DueTask, ReminderWindow, SyncRecord, SyncRecordId, Task, TaskId,
    TaskStatus, User, UserId,
};

use super::{StorageError, SyncRecordStore, TaskStore};

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub push_token: Option<String>,
}

pub struct NewTask {
    pub title: String,
    pub status: TaskStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub user_id: UserId,
    pub category_id: CategoryId,
}

#[derive(Default)]
struct Store {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    categories: BTreeMap<CategoryId, Category>,
    tasks: BTreeMap<TaskId, Task>,
    sync_records: HashMap<String, SyncRecord>,
}

impl Store {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn load_due_task(&self, task: &Task) -> Option<DueTask> {
        let owner = self.users.get(&task.user_id)?;
        let category = self.categories.get(&task.category_id)?;

        Some(DueTask {
            task: task.clone(),
            owner: owner.clone(),
            category: category.clone(),
        })
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, StorageError> {
        self.tasks.get_mut(&id).ok_or(StorageError::TaskNotFound(id))
    }
}

/// Process-local store. Tasks are returned in id order.
///
/// Besides the scheduler-facing traits it exposes the handful of writes the
/// CRUD side performs, so scans can be exercised against concurrent edits.
#[derive(Default)]
pub struct InMemoryStore {
    store: RwLock<Store>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: NewUser) -> User {
        let mut store = self.store.write().await;
        let user = User {
            id: store.allocate_id(),
            name: user.name,
            email: user.email,
            push_token: user.push_token,
        };
        store.users.insert(user.id, user.clone());
        user
    }

    pub async fn insert_category(&self, name: &str) -> Category {
        let mut store = self.store.write().await;
        let category = Category {
            id: store.allocate_id(),
            name: name.to_owned(),
        };
        store.categories.insert(category.id, category.clone());
        category
    }

    pub async fn insert_task(&self, task: NewTask) -> Task {
        let mut store = self.store.write().await;
        let task = Task {
            id: store.allocate_id(),
            title: task.title,
            status: task.status,
            deadline: task.deadline,
            reminder_sent_at: None,
            user_id: task.user_id,
            category_id: task.category_id,
            deleted_at: None,
        };
        store.tasks.insert(task.id, task.clone());
        task
    }

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.store.read().await.tasks.get(&id).cloned()
    }

    pub async fn set_push_token(&self, user_id: UserId, push_token: Option<String>) {
        if let Some(user) = self.store.write().await.users.get_mut(&user_id) {
            user.push_token = push_token;
        }
    }

    pub async fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<(), StorageError> {
        self.store.write().await.task_mut(id)?.status = status;
        Ok(())
    }

    /// Moves the deadline. A new deadline is owed a new reminder, so the stamp is cleared.
    pub async fn reschedule_task(
        &self,
        id: TaskId,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let mut store = self.store.write().await;
        let task = store.task_mut(id)?;
        if task.deadline != deadline {
            task.deadline = deadline;
            task.reminder_sent_at = None;
        }
        Ok(())
    }

    pub async fn soft_delete_task(&self, id: TaskId) -> Result<(), StorageError> {
        self.store.write().await.task_mut(id)?.deleted_at = Some(Utc::now());
        Ok(())
    }

    pub async fn get_sync_record(&self, source: &str) -> Option<SyncRecord> {
        self.store.read().await.sync_records.get(source).cloned()
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn find_due_for_reminder(
        &self,
        window: &ReminderWindow,
    ) -> Result<Vec<DueTask>, StorageError> {
        let store = self.store.read().await;
        let due_tasks = store
            .tasks
            .values()
            .filter(|task| task.is_due_for_reminder(window))
            .filter_map(|task| {
                let due_task = store.load_due_task(task);
                if due_task.is_none() {
                    log::warn!(
                        "Task references a missing owner or category, ignoring. [task_id = {}]",
                        task.id
                    );
                }
                due_task
            })
            .collect();

        Ok(due_tasks)
    }

    async fn get_with_owner(&self, id: TaskId) -> Result<Option<DueTask>, StorageError> {
        let store = self.store.read().await;
        Ok(store
            .tasks
            .get(&id)
            .filter(|task| task.deleted_at.is_none())
            .and_then(|task| store.load_due_task(task)))
    }

    async fn mark_reminded(&self, id: TaskId, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.store.write().await.task_mut(id)?.reminder_sent_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl SyncRecordStore for InMemoryStore {
    async fn find_or_create(&self, source: &str) -> Result<SyncRecord, StorageError> {
        let mut store = self.store.write().await;
        if let Some(record) = store.sync_records.get(source) {
            return Ok(record.clone());
        }

        let id: SyncRecordId = store.allocate_id();
        let record = SyncRecord::new(id, source);
        store.sync_records.insert(source.to_owned(), record.clone());
        Ok(record)
    }

    async fn save(&self, record: &SyncRecord) -> Result<(), StorageError> {
        self.store
            .write()
            .await
            .sync_records
            .insert(record.source.clone(), record.clone());
        Ok(())
    }
}
