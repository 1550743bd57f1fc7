use crate::store::{LedgerEntry, LedgerStorage};
use chrono::Utc;
use questline_types::{QuestlineError, Result, TokenAmount, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

/// Guard for a multi-credit ledger transaction. While it lives, every
/// write must go through `credit_within`; dropping the guard releases
/// the transaction lock, and the caller must have committed or rolled
/// back the storage snapshot first.
pub struct LedgerTransaction {
    _guard: OwnedMutexGuard<()>,
}

/// Owns every balance mutation in the system. All writes go through
/// `credit`, which adjusts the balance and appends the matching ledger
/// entry as one unit, so the reconciliation invariant
/// (balance == sum of entry deltas) holds at every observation point.
pub struct LedgerManager {
    storage: Arc<dyn LedgerStorage>,
    cache: Arc<RwLock<HashMap<UserId, TokenAmount>>>,
    tx_lock: Arc<Mutex<()>>,
}

impl LedgerManager {
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self {
            storage,
            cache: Arc::new(RwLock::new(HashMap::new())),
            tx_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn balance(&self, user: UserId) -> Result<TokenAmount> {
        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(balance) = cache.get(&user) {
                return Ok(*balance);
            }
        }

        // Load from storage
        let balance = self.storage.get_balance(user).await?;

        // Update cache
        let mut cache = self.cache.write().await;
        cache.insert(user, balance);

        Ok(balance)
    }

    /// Apply a signed delta to the user's balance and append the ledger
    /// entry carrying the same delta and reason. Balances floor at
    /// zero: a delta that would underflow is rejected with
    /// `InsufficientBalance` and leaves both balance and history
    /// untouched.
    ///
    /// Standalone credits take the transaction lock for the duration of
    /// the write. A credit can therefore never land inside an open
    /// snapshot and be erased by that transaction's rollback.
    pub async fn credit(&self, user: UserId, delta: i64, reason: &str) -> Result<TokenAmount> {
        let _lock = self.tx_lock.lock().await;
        self.apply(user, delta, reason).await
    }

    /// Credit inside an open transaction. The guard is proof the caller
    /// holds the transaction lock, so taking it again here would
    /// deadlock.
    pub async fn credit_within(
        &self,
        _tx: &LedgerTransaction,
        user: UserId,
        delta: i64,
        reason: &str,
    ) -> Result<TokenAmount> {
        self.apply(user, delta, reason).await
    }

    async fn apply(&self, user: UserId, delta: i64, reason: &str) -> Result<TokenAmount> {
        let current = self.storage.get_balance(user).await?;

        if delta == 0 {
            return Ok(current);
        }

        let new_balance = current.checked_apply(delta).ok_or_else(|| {
            if delta < 0 {
                QuestlineError::InsufficientBalance {
                    has: current.to_tokens(),
                    needs: delta.unsigned_abs(),
                }
            } else {
                QuestlineError::Storage(format!("balance overflow for user {}", user))
            }
        })?;

        let entry = LedgerEntry {
            user_id: user,
            delta,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        };
        self.storage.apply_credit(user, new_balance, entry).await?;

        // Update cache
        let mut cache = self.cache.write().await;
        cache.insert(user, new_balance);

        info!(
            user = %user,
            delta = delta,
            balance_before = current.to_tokens(),
            balance_after = new_balance.to_tokens(),
            reason = %reason,
            "💰 Balance credited"
        );
        Ok(new_balance)
    }

    /// Begin a multi-credit transaction. Transactions are serialized
    /// through a single lock so a snapshot can never be clobbered by a
    /// concurrent writer; the returned guard must be held until the
    /// matching commit or rollback has run.
    pub async fn begin_transaction(&self) -> Result<LedgerTransaction> {
        let guard = self.tx_lock.clone().lock_owned().await;
        self.storage.begin_transaction().await?;
        Ok(LedgerTransaction { _guard: guard })
    }

    pub async fn commit_transaction(&self) -> Result<()> {
        self.storage.commit_transaction().await
    }

    pub async fn rollback_transaction(&self) -> Result<()> {
        self.storage.rollback_transaction().await?;
        // Cached balances may now be stale; drop them all.
        let mut cache = self.cache.write().await;
        let cleared = cache.len();
        cache.clear();
        debug!(entries_cleared = cleared, "🧹 Balance cache cleared after rollback");
        Ok(())
    }

    pub async fn history(&self, user: UserId) -> Result<Vec<LedgerEntry>> {
        self.storage.entries_for(user).await
    }

    /// Verify the reconciliation invariant for one user: the stored
    /// balance must equal the sum of that user's entry deltas.
    pub async fn reconcile(&self, user: UserId) -> Result<bool> {
        let balance = self.storage.get_balance(user).await?;
        let entries = self.storage.entries_for(user).await?;
        let sum: i64 = entries.iter().map(|e| e.delta).sum();
        Ok(sum >= 0 && balance.to_tokens() == sum as u64)
    }

    /// Total tokens currently held across all users.
    pub async fn circulating_total(&self) -> Result<TokenAmount> {
        let users = self.storage.get_all_users().await?;
        let mut total = TokenAmount::ZERO;
        for user in users {
            let balance = self.storage.get_balance(user).await?;
            total = total.saturating_add(balance);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStorage;

    fn manager() -> LedgerManager {
        LedgerManager::new(Arc::new(MemoryLedgerStorage::new()))
    }

    #[tokio::test]
    async fn test_credit_appends_matching_entry() {
        let ledger = manager();
        let user = UserId::new(1);

        let balance = ledger.credit(user, 15000, "Task 1 completed").await.unwrap();
        assert_eq!(balance, TokenAmount::from_tokens(15000));

        let history = ledger.history(user).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].delta, 15000);
        assert_eq!(history[0].reason, "Task 1 completed");
        assert!(ledger.reconcile(user).await.unwrap());
    }

    #[tokio::test]
    async fn test_negative_delta_floors_at_zero() {
        let ledger = manager();
        let user = UserId::new(2);

        ledger.credit(user, 100, "seed").await.unwrap();
        let err = ledger.credit(user, -101, "adjustment").await.unwrap_err();
        assert!(matches!(
            err,
            QuestlineError::InsufficientBalance { has: 100, needs: 101 }
        ));

        // Rejection leaves both balance and history untouched.
        assert_eq!(
            ledger.balance(user).await.unwrap(),
            TokenAmount::from_tokens(100)
        );
        assert_eq!(ledger.history(user).await.unwrap().len(), 1);
        assert!(ledger.reconcile(user).await.unwrap());
    }

    #[tokio::test]
    async fn test_negative_delta_down_to_zero_is_allowed() {
        let ledger = manager();
        let user = UserId::new(3);

        ledger.credit(user, 100, "seed").await.unwrap();
        let balance = ledger.credit(user, -100, "adjustment").await.unwrap();
        assert_eq!(balance, TokenAmount::ZERO);
        assert!(ledger.reconcile(user).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_delta_is_a_no_op() {
        let ledger = manager();
        let user = UserId::new(4);

        ledger.credit(user, 0, "noop").await.unwrap();
        assert!(ledger.history(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_reverts_credits_and_cache() {
        let ledger = manager();
        let user = UserId::new(5);

        ledger.credit(user, 1000, "seed").await.unwrap();

        let tx = ledger.begin_transaction().await.unwrap();
        ledger.credit_within(&tx, user, 5000, "doomed").await.unwrap();
        ledger.rollback_transaction().await.unwrap();
        drop(tx);

        assert_eq!(
            ledger.balance(user).await.unwrap(),
            TokenAmount::from_tokens(1000)
        );
        assert_eq!(ledger.history(user).await.unwrap().len(), 1);
        assert!(ledger.reconcile(user).await.unwrap());
    }

    #[tokio::test]
    async fn test_standalone_credit_survives_concurrent_rollback() {
        let ledger = Arc::new(manager());
        let referrer = UserId::new(8);
        let actor = UserId::new(9);

        let tx = ledger.begin_transaction().await.unwrap();
        ledger.credit_within(&tx, actor, 500, "doomed").await.unwrap();

        // A signup bonus racing the open transaction must wait for the
        // snapshot to resolve instead of landing inside it.
        let bonus = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger.credit(referrer, 1000, "Referral bonus for 9").await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        ledger.rollback_transaction().await.unwrap();
        drop(tx);
        bonus.await.unwrap().unwrap();

        assert_eq!(
            ledger.balance(referrer).await.unwrap(),
            TokenAmount::from_tokens(1000)
        );
        assert_eq!(ledger.balance(actor).await.unwrap(), TokenAmount::ZERO);
        assert!(ledger.reconcile(referrer).await.unwrap());
        assert!(ledger.reconcile(actor).await.unwrap());
    }

    #[tokio::test]
    async fn test_circulating_total() {
        let ledger = manager();
        ledger.credit(UserId::new(6), 100, "a").await.unwrap();
        ledger.credit(UserId::new(7), 250, "b").await.unwrap();

        assert_eq!(
            ledger.circulating_total().await.unwrap(),
            TokenAmount::from_tokens(350)
        );
    }
}
