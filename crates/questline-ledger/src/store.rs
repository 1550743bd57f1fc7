use async_trait::async_trait;
use chrono::{DateTime, Utc};
use questline_types::{Result, TokenAmount, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Immutable record of a single balance change. Entries are append-only
/// and are never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub user_id: UserId,
    pub delta: i64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

// Type aliases for complex types
type BalanceMap = HashMap<UserId, TokenAmount>;
type TransactionBackup = Option<(BalanceMap, Vec<LedgerEntry>)>;

#[async_trait]
pub trait LedgerStorage: Send + Sync {
    async fn get_balance(&self, user: UserId) -> Result<TokenAmount>;
    async fn get_all_users(&self) -> Result<Vec<UserId>>;

    /// Store the new balance and append the matching ledger entry as a
    /// single unit. A backend must never persist one without the other.
    async fn apply_credit(
        &self,
        user: UserId,
        new_balance: TokenAmount,
        entry: LedgerEntry,
    ) -> Result<()>;

    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;

    async fn entries_for(&self, user: UserId) -> Result<Vec<LedgerEntry>>;
}

pub struct MemoryLedgerStorage {
    balances: Arc<RwLock<BalanceMap>>,
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
    transaction_backup: Arc<RwLock<TransactionBackup>>,
}

impl Default for MemoryLedgerStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStorage {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
            entries: Arc::new(RwLock::new(Vec::new())),
            transaction_backup: Arc::new(RwLock::new(None)),
        }
    }
}

#[async_trait]
impl LedgerStorage for MemoryLedgerStorage {
    async fn get_balance(&self, user: UserId) -> Result<TokenAmount> {
        let balances = self.balances.read().await;
        Ok(balances.get(&user).copied().unwrap_or(TokenAmount::ZERO))
    }

    async fn get_all_users(&self) -> Result<Vec<UserId>> {
        let balances = self.balances.read().await;
        Ok(balances.keys().copied().collect())
    }

    async fn apply_credit(
        &self,
        user: UserId,
        new_balance: TokenAmount,
        entry: LedgerEntry,
    ) -> Result<()> {
        // Both locks held across the write so balance and history can
        // never diverge, even if a reader interleaves.
        let mut balances = self.balances.write().await;
        let mut entries = self.entries.write().await;

        let old_balance = balances.get(&user).copied().unwrap_or(TokenAmount::ZERO);
        balances.insert(user, new_balance);
        entries.push(entry.clone());

        info!(
            user = %user,
            delta = entry.delta,
            balance_before = old_balance.to_tokens(),
            balance_after = new_balance.to_tokens(),
            reason = %entry.reason,
            storage_type = "memory",
            "💾 Credit applied"
        );
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let balances = self.balances.read().await;
        let entries = self.entries.read().await;

        let mut backup = self.transaction_backup.write().await;
        *backup = Some((balances.clone(), entries.clone()));

        info!(
            accounts_count = balances.len(),
            entries_count = entries.len(),
            storage_type = "memory",
            "📝 Transaction began (snapshot created)"
        );
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut backup = self.transaction_backup.write().await;
        let had_backup = backup.is_some();
        *backup = None;

        if had_backup {
            info!(
                storage_type = "memory",
                "✅ Transaction committed (snapshot discarded)"
            );
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut backup = self.transaction_backup.write().await;

        if let Some((balance_backup, entry_backup)) = backup.take() {
            let mut balances = self.balances.write().await;
            let mut entries = self.entries.write().await;

            *balances = balance_backup;
            *entries = entry_backup;

            info!(
                accounts_after = balances.len(),
                entries_after = entries.len(),
                storage_type = "memory",
                "❌ Transaction rolled back (snapshot restored)"
            );
        }

        Ok(())
    }

    async fn entries_for(&self, user: UserId) -> Result<Vec<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.user_id == user)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: UserId, delta: i64, reason: &str) -> LedgerEntry {
        LedgerEntry {
            user_id: user,
            delta,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_apply_credit_keeps_balance_and_history_together() {
        let storage = MemoryLedgerStorage::new();
        let user = UserId::new(1);

        storage
            .apply_credit(
                user,
                TokenAmount::from_tokens(500),
                entry(user, 500, "Task 1 completed"),
            )
            .await
            .unwrap();

        assert_eq!(
            storage.get_balance(user).await.unwrap(),
            TokenAmount::from_tokens(500)
        );
        let history = storage.entries_for(user).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].delta, 500);
    }

    #[tokio::test]
    async fn test_rollback_restores_balances_and_entries() {
        let storage = MemoryLedgerStorage::new();
        let user = UserId::new(2);

        storage
            .apply_credit(user, TokenAmount::from_tokens(100), entry(user, 100, "seed"))
            .await
            .unwrap();

        storage.begin_transaction().await.unwrap();
        storage
            .apply_credit(user, TokenAmount::from_tokens(600), entry(user, 500, "more"))
            .await
            .unwrap();
        storage.rollback_transaction().await.unwrap();

        assert_eq!(
            storage.get_balance(user).await.unwrap(),
            TokenAmount::from_tokens(100)
        );
        assert_eq!(storage.entries_for(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_discards_snapshot() {
        let storage = MemoryLedgerStorage::new();
        let user = UserId::new(3);

        storage.begin_transaction().await.unwrap();
        storage
            .apply_credit(user, TokenAmount::from_tokens(50), entry(user, 50, "seed"))
            .await
            .unwrap();
        storage.commit_transaction().await.unwrap();

        // A rollback after commit must be a no-op.
        storage.rollback_transaction().await.unwrap();
        assert_eq!(
            storage.get_balance(user).await.unwrap(),
            TokenAmount::from_tokens(50)
        );
    }
}
