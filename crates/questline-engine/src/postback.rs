use crate::completion::{CompletionEngine, CompletionOutcome};
use questline_registry::TaskRegistry;
use questline_types::{PostbackEvent, QuestlineError, Result, TaskId, UserId};
use std::sync::Arc;
use tracing::{info, warn};

/// Maps third-party affiliate postbacks onto the completion engine.
/// This is a trust boundary: the only job here is to stop cross-type
/// reward fraud (claiming a registration reward via a deposit event or
/// vice versa) before the engine is ever invoked.
pub struct PostbackAdapter {
    engine: Arc<CompletionEngine>,
    tasks: Arc<TaskRegistry>,
}

impl PostbackAdapter {
    pub fn new(engine: Arc<CompletionEngine>, tasks: Arc<TaskRegistry>) -> Self {
        Self { engine, tasks }
    }

    pub async fn handle(
        &self,
        user_id: UserId,
        task_id: TaskId,
        event: &str,
    ) -> Result<CompletionOutcome> {
        let event = PostbackEvent::parse(event)?;

        if !user_id.is_valid() || !task_id.is_valid() {
            return Err(QuestlineError::Validation(
                "user_id and task_id are required".to_string(),
            ));
        }

        let task = self.tasks.get_task(task_id).await?;
        if !event.matches(&task.task_type) {
            // Logged for anti-fraud review.
            warn!(
                user = %user_id,
                task = %task_id,
                event = %event,
                task_type = %task.task_type,
                "🚨 Postback rejected: event does not match task type"
            );
            return Err(QuestlineError::TypeMismatch {
                event: event.to_string(),
                task_type: task.task_type.to_string(),
            });
        }

        info!(user = %user_id, task = %task_id, event = %event, "📬 Postback accepted");
        self.engine.complete(user_id, task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_ledger::{LedgerManager, MemoryLedgerStorage};
    use questline_registry::{TaskDraft, UserDirectory};
    use questline_types::{Rarity, TaskType, TokenAmount};

    struct Fixture {
        adapter: PostbackAdapter,
        tasks: Arc<TaskRegistry>,
        ledger: Arc<LedgerManager>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(LedgerManager::new(Arc::new(MemoryLedgerStorage::new())));
        let users = Arc::new(UserDirectory::new(ledger.clone()));
        let tasks = Arc::new(TaskRegistry::new());
        let engine = Arc::new(CompletionEngine::new(users, tasks.clone(), ledger.clone()));
        Fixture {
            adapter: PostbackAdapter::new(engine, tasks.clone()),
            tasks,
            ledger,
        }
    }

    fn draft(task_type: TaskType) -> TaskDraft {
        TaskDraft {
            title: "offer".to_string(),
            description: String::new(),
            task_type,
            rarity: Rarity::Normal,
            reward: 2000,
        }
    }

    #[tokio::test]
    async fn test_matching_event_completes_task() {
        let fx = fixture();
        let user = UserId::new(1);
        let task = fx.tasks.create_task(draft(TaskType::Deposit)).await.unwrap();

        let outcome = fx.adapter.handle(user, task.id, "deposit").await.unwrap();
        assert_eq!(outcome, CompletionOutcome::Rewarded);
        assert_eq!(
            fx.ledger.balance(user).await.unwrap(),
            TokenAmount::from_tokens(2000)
        );
    }

    #[tokio::test]
    async fn test_type_mismatch_rejected_without_side_effects() {
        let fx = fixture();
        let user = UserId::new(2);
        let task = fx
            .tasks
            .create_task(draft(TaskType::Registration))
            .await
            .unwrap();

        let err = fx.adapter.handle(user, task.id, "deposit").await.unwrap_err();
        assert!(matches!(err, QuestlineError::TypeMismatch { .. }));

        assert_eq!(fx.ledger.balance(user).await.unwrap(), TokenAmount::ZERO);
        assert!(fx.ledger.history(user).await.unwrap().is_empty());
        assert!(fx.tasks.user_task(user, task.id).await.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_event_rejected() {
        let fx = fixture();
        let task = fx.tasks.create_task(draft(TaskType::Deposit)).await.unwrap();

        let err = fx
            .adapter
            .handle(UserId::new(3), task.id, "refund")
            .await
            .unwrap_err();
        assert!(matches!(err, QuestlineError::UnsupportedEvent(_)));
    }

    #[tokio::test]
    async fn test_unknown_task_rejected() {
        let fx = fixture();
        let err = fx
            .adapter
            .handle(UserId::new(4), TaskId::new(42), "deposit")
            .await
            .unwrap_err();
        assert!(matches!(err, QuestlineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_postback_pays_once() {
        let fx = fixture();
        let user = UserId::new(5);
        let task = fx.tasks.create_task(draft(TaskType::Deposit)).await.unwrap();

        fx.adapter.handle(user, task.id, "deposit").await.unwrap();
        let outcome = fx.adapter.handle(user, task.id, "deposit").await.unwrap();

        assert_eq!(outcome, CompletionOutcome::AlreadyCompleted);
        assert_eq!(fx.ledger.history(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_free_form_task_type_never_matches_postbacks() {
        let fx = fixture();
        let task = fx
            .tasks
            .create_task(draft(TaskType::Other("promo".to_string())))
            .await
            .unwrap();

        let err = fx
            .adapter
            .handle(UserId::new(6), task.id, "registration")
            .await
            .unwrap_err();
        assert!(matches!(err, QuestlineError::TypeMismatch { .. }));
    }
}
