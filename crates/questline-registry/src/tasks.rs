use chrono::{DateTime, Utc};
use questline_types::{CompletionStatus, QuestlineError, Rarity, Result, TaskId, TaskType, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub rarity: Rarity,
    /// Reward read at completion time; editing it later never rewrites
    /// ledger history for completions that already happened.
    pub reward: u64,
    pub is_active: bool,
}

/// Fields an operator supplies when creating or editing a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub rarity: Rarity,
    pub reward: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTask {
    pub user_id: UserId,
    pub task_id: TaskId,
    pub status: CompletionStatus,
    pub enabled: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Holds task definitions and per-user completion state. Mutation of
/// completion records is driven by the completion engine; operators
/// only create/edit tasks and flip visibility flags.
pub struct TaskRegistry {
    tasks: Arc<RwLock<BTreeMap<TaskId, Task>>>,
    user_tasks: Arc<RwLock<HashMap<(UserId, TaskId), UserTask>>>,
    next_id: AtomicI64,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(BTreeMap::new())),
            user_tasks: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task> {
        if i64::try_from(draft.reward).is_err() {
            return Err(QuestlineError::Validation(
                "reward exceeds maximum representable delta".to_string(),
            ));
        }

        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let task = Task {
            id,
            title: draft.title,
            description: draft.description,
            task_type: draft.task_type,
            rarity: draft.rarity,
            reward: draft.reward,
            is_active: true,
        };

        let mut tasks = self.tasks.write().await;
        tasks.insert(id, task.clone());
        info!(task = %id, title = %task.title, reward = task.reward, "📋 Task created");
        Ok(task)
    }

    pub async fn update_task(&self, id: TaskId, draft: TaskDraft) -> Result<Task> {
        if i64::try_from(draft.reward).is_err() {
            return Err(QuestlineError::Validation(
                "reward exceeds maximum representable delta".to_string(),
            ));
        }

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| QuestlineError::NotFound(format!("task {}", id)))?;
        task.title = draft.title;
        task.description = draft.description;
        task.task_type = draft.task_type;
        task.rarity = draft.rarity;
        task.reward = draft.reward;
        Ok(task.clone())
    }

    pub async fn toggle_task(&self, id: TaskId) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| QuestlineError::NotFound(format!("task {}", id)))?;
        task.is_active = !task.is_active;
        debug!(task = %id, is_active = task.is_active, "Task visibility toggled");
        Ok(task.clone())
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        tasks
            .remove(&id)
            .ok_or_else(|| QuestlineError::NotFound(format!("task {}", id)))?;
        Ok(())
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        let tasks = self.tasks.read().await;
        tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| QuestlineError::NotFound(format!("task {}", id)))
    }

    pub async fn all_tasks(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        tasks.values().cloned().collect()
    }

    /// Left-outer-join view for one user, ordered by task id. A task is
    /// visible iff it is active AND there is either no per-user record
    /// or that record is enabled. Tasks the user never touched still
    /// appear, with no completion state attached.
    pub async fn list_visible_tasks(&self, user: UserId) -> Vec<(Task, Option<UserTask>)> {
        let tasks = self.tasks.read().await;
        let user_tasks = self.user_tasks.read().await;

        tasks
            .values()
            .filter(|t| t.is_active)
            .filter_map(|t| match user_tasks.get(&(user, t.id)) {
                Some(record) if !record.enabled => None,
                Some(record) => Some((t.clone(), Some(record.clone()))),
                None => Some((t.clone(), None)),
            })
            .collect()
    }

    pub async fn user_task(&self, user: UserId, task: TaskId) -> Option<UserTask> {
        let user_tasks = self.user_tasks.read().await;
        user_tasks.get(&(user, task)).cloned()
    }

    /// Upsert the completion record to `completed`. Returns the prior
    /// record so a failed ledger transaction can restore it.
    pub async fn mark_completed(&self, user: UserId, task: TaskId) -> Option<UserTask> {
        let mut user_tasks = self.user_tasks.write().await;
        let prior = user_tasks.get(&(user, task)).cloned();

        let record = UserTask {
            user_id: user,
            task_id: task,
            status: CompletionStatus::Completed,
            // An existing record keeps its enabled flag, matching the
            // upsert-on-conflict behavior of the completion path.
            enabled: prior.as_ref().map(|r| r.enabled).unwrap_or(true),
            completed_at: Some(Utc::now()),
        };
        user_tasks.insert((user, task), record);
        prior
    }

    /// Undo a `mark_completed` whose ledger transaction failed.
    pub async fn restore_user_task(&self, user: UserId, task: TaskId, prior: Option<UserTask>) {
        let mut user_tasks = self.user_tasks.write().await;
        match prior {
            Some(record) => {
                user_tasks.insert((user, task), record);
            }
            None => {
                user_tasks.remove(&(user, task));
            }
        }
    }

    /// Operator-side per-user visibility switch. With no existing
    /// record this assigns the task disabled in `pending` state;
    /// otherwise it flips the enabled flag and leaves status alone.
    pub async fn toggle_user_task(&self, user: UserId, task: TaskId) -> Result<UserTask> {
        // The task must exist even if it was never attempted.
        self.get_task(task).await?;

        let mut user_tasks = self.user_tasks.write().await;
        let record = user_tasks
            .entry((user, task))
            .and_modify(|r| r.enabled = !r.enabled)
            .or_insert_with(|| UserTask {
                user_id: user,
                task_id: task,
                status: CompletionStatus::Pending,
                enabled: false,
                completed_at: None,
            });
        Ok(record.clone())
    }

    pub async fn completed_count(&self) -> usize {
        let user_tasks = self.user_tasks.read().await;
        user_tasks
            .values()
            .filter(|r| r.status == CompletionStatus::Completed)
            .count()
    }
}
