use chrono::{DateTime, Utc};
use questline_ledger::LedgerManager;
use questline_types::{QuestlineError, Result, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tokens credited to the referrer when a referred user is created.
/// Paid once, at first contact, never on repeat lookups.
pub const SIGNUP_REFERRAL_BONUS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Set once at creation, never mutated afterwards.
    pub referred_by: Option<UserId>,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserStats {
    pub total_users: usize,
    pub active_users: usize,
    pub referrals: usize,
}

/// Users are created on first contact and never deleted. Balance state
/// lives in the ledger; the directory only holds identity and flags.
pub struct UserDirectory {
    ledger: Arc<LedgerManager>,
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl UserDirectory {
    pub fn new(ledger: Arc<LedgerManager>) -> Self {
        Self {
            ledger,
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Look the user up, creating them on first contact. A referrer
    /// passed for an already-known user is ignored: `referred_by` is
    /// written exactly once. The signup bonus is credited only on the
    /// creation path, so repeat calls can never double-apply it.
    pub async fn ensure_user(
        &self,
        id: UserId,
        username: Option<&str>,
        referred_by: Option<UserId>,
    ) -> Result<User> {
        if !id.is_valid() {
            return Err(QuestlineError::Validation(format!("invalid user id: {}", id)));
        }

        let created = {
            let mut users = self.users.write().await;
            if let Some(existing) = users.get(&id) {
                return Ok(existing.clone());
            }

            // Self-referrals and malformed ids never attach.
            let referrer = referred_by.filter(|r| r.is_valid() && *r != id);
            let user = User {
                id,
                username: username.map(str::to_string),
                first_name: None,
                last_name: None,
                referred_by: referrer,
                is_banned: false,
                created_at: Utc::now(),
            };
            users.insert(id, user.clone());
            user
        };

        info!(
            user = %id,
            referred_by = ?created.referred_by.map(|r| r.as_i64()),
            "👤 User created"
        );

        if let Some(referrer) = created.referred_by {
            self.ledger
                .credit(
                    referrer,
                    SIGNUP_REFERRAL_BONUS as i64,
                    &format!("Referral bonus for {}", id),
                )
                .await?;
        }

        Ok(created)
    }

    pub async fn get(&self, id: UserId) -> Option<User> {
        let users = self.users.read().await;
        users.get(&id).cloned()
    }

    pub async fn set_banned(&self, id: UserId, banned: bool) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| QuestlineError::NotFound(format!("user {}", id)))?;
        user.is_banned = banned;
        debug!(user = %id, banned = banned, "Ban flag updated");
        Ok(())
    }

    /// Administrative balance correction. Goes through the ledger like
    /// every other mutation so history stays reconcilable; floors at
    /// zero like any credit.
    pub async fn adjust_balance(&self, id: UserId, target: u64) -> Result<()> {
        let current = self.ledger.balance(id).await?.to_tokens();
        let delta = target as i64 - current as i64;
        if delta != 0 {
            self.ledger.credit(id, delta, "Balance adjustment").await?;
        }
        Ok(())
    }

    /// Recipients for broadcast fan-out: everyone not banned.
    pub async fn all_active(&self) -> Vec<UserId> {
        let users = self.users.read().await;
        let mut active: Vec<UserId> = users
            .values()
            .filter(|u| !u.is_banned)
            .map(|u| u.id)
            .collect();
        active.sort();
        active
    }

    pub async fn stats(&self) -> UserStats {
        let users = self.users.read().await;
        UserStats {
            total_users: users.len(),
            active_users: users.values().filter(|u| !u.is_banned).count(),
            referrals: users.values().filter(|u| u.referred_by.is_some()).count(),
        }
    }
}
