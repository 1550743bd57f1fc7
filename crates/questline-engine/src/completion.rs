use questline_ledger::{LedgerManager, LedgerTransaction};
use questline_registry::{Task, TaskRegistry, UserDirectory};
use questline_types::{
    CompletionStatus, QuestlineError, Rarity, Result, TaskId, TaskType, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tokens credited to the referrer when a referred user completes a
/// Limited deposit task. A side effect of the triggering completion,
/// paid at most once per (user, task) because completion itself is
/// idempotent.
pub const DEPOSIT_REFERRAL_BONUS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// First completion: status transitioned and rewards were paid.
    Rewarded,
    /// The pair was already completed; the call had no side effects.
    AlreadyCompleted,
}

/// Orchestrates the completion state machine:
/// NeverAttempted -> (Pending ->) Completed, with Completed terminal.
/// Concurrent calls for one (user, task) pair serialize through a
/// per-key lock so exactly one logical completion can occur.
pub struct CompletionEngine {
    users: Arc<UserDirectory>,
    tasks: Arc<TaskRegistry>,
    ledger: Arc<LedgerManager>,
    locks: Mutex<HashMap<(UserId, TaskId), Arc<Mutex<()>>>>,
}

impl CompletionEngine {
    pub fn new(
        users: Arc<UserDirectory>,
        tasks: Arc<TaskRegistry>,
        ledger: Arc<LedgerManager>,
    ) -> Self {
        Self {
            users,
            tasks,
            ledger,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn pair_lock(&self, user: UserId, task: TaskId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((user, task))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the pair's lock entry once the pair is terminal. Completed
    /// is checked before any credit, so a straggler that recreates the
    /// entry later still short-circuits without paying.
    async fn discard_pair_lock(&self, user: UserId, task: TaskId) {
        let mut locks = self.locks.lock().await;
        locks.remove(&(user, task));
    }

    #[cfg(test)]
    async fn pair_lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Complete a task for a user. Re-invoking on an already-completed
    /// pair is a success with no side effects: no second credit, no
    /// duplicate ledger entry, no cascade.
    pub async fn complete(&self, user_id: UserId, task_id: TaskId) -> Result<CompletionOutcome> {
        if !user_id.is_valid() || !task_id.is_valid() {
            return Err(QuestlineError::Validation(
                "user_id and task_id are required".to_string(),
            ));
        }

        let user = self.users.ensure_user(user_id, None, None).await?;
        let task = self.tasks.get_task(task_id).await?;

        let lock = self.pair_lock(user_id, task_id).await;
        let guard = lock.lock().await;

        if let Some(record) = self.tasks.user_task(user_id, task_id).await {
            if record.status == CompletionStatus::Completed {
                debug!(
                    user = %user_id,
                    task = %task_id,
                    "Task already completed, skipping credit"
                );
                drop(guard);
                self.discard_pair_lock(user_id, task_id).await;
                return Ok(CompletionOutcome::AlreadyCompleted);
            }
        }

        // Transition first, then pay inside one ledger transaction. If
        // any credit fails the transaction is rolled back and the
        // status transition is undone, so no partially-applied
        // completion can survive.
        let prior = self.tasks.mark_completed(user_id, task_id).await;
        let tx = self.ledger.begin_transaction().await?;

        match self
            .apply_rewards(&tx, user_id, user.referred_by, &task)
            .await
        {
            Ok(()) => {
                self.ledger.commit_transaction().await?;
                drop(tx);
                drop(guard);
                self.discard_pair_lock(user_id, task_id).await;
                info!(
                    user = %user_id,
                    task = %task_id,
                    reward = task.reward,
                    "🎉 Task completed"
                );
                Ok(CompletionOutcome::Rewarded)
            }
            Err(e) => {
                self.ledger.rollback_transaction().await?;
                drop(tx);
                self.tasks.restore_user_task(user_id, task_id, prior).await;
                warn!(
                    user = %user_id,
                    task = %task_id,
                    error = %e,
                    "Completion aborted, state restored"
                );
                Err(QuestlineError::Storage(format!(
                    "completion of task {} for user {} failed: {}",
                    task_id, user_id, e
                )))
            }
        }
    }

    async fn apply_rewards(
        &self,
        tx: &LedgerTransaction,
        user_id: UserId,
        referred_by: Option<UserId>,
        task: &Task,
    ) -> Result<()> {
        let reward = i64::try_from(task.reward).map_err(|_| {
            QuestlineError::Validation(format!("task {} reward too large", task.id))
        })?;

        self.ledger
            .credit_within(tx, user_id, reward, &format!("Task {} completed", task.id))
            .await?;

        // Cascade fires only for Limited deposit tasks completed by a
        // referred user; the bonus goes to the referrer.
        if let Some(referrer) = referred_by {
            if task.task_type == TaskType::Deposit && task.rarity == Rarity::Limited {
                self.ledger
                    .credit_within(
                        tx,
                        referrer,
                        DEPOSIT_REFERRAL_BONUS as i64,
                        &format!("Referral bonus for task {}", task.id),
                    )
                    .await?;
                info!(
                    referrer = %referrer,
                    user = %user_id,
                    task = %task.id,
                    bonus = DEPOSIT_REFERRAL_BONUS,
                    "🤝 Referral cascade paid"
                );
            }
        }

        Ok(())
    }
}
