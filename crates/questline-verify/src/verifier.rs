use crate::client::MembershipClient;
use questline_registry::{Channel, ChannelRegistry};
use questline_types::UserId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Checks the user's membership in every configured channel and reports
/// the ones that are not satisfied, in configured order. Advisory
/// gating for entry into the mini-app flow, not a hard block on task
/// completion.
pub struct SubscriptionVerifier {
    channels: Arc<ChannelRegistry>,
    client: Arc<dyn MembershipClient>,
}

impl SubscriptionVerifier {
    pub fn new(channels: Arc<ChannelRegistry>, client: Arc<dyn MembershipClient>) -> Self {
        Self { channels, client }
    }

    /// Fail-closed: a failed or timed-out membership call counts the
    /// channel as missing and is never surfaced to the caller. Always
    /// returns a list, possibly containing every configured channel.
    pub async fn missing_channels(&self, user: UserId) -> Vec<Channel> {
        let mut missing = Vec::new();

        for channel in self.channels.all().await {
            match self.client.member_status(channel.id, user).await {
                Ok(status) if status.is_subscribed() => {
                    debug!(user = %user, channel = %channel.id, "Subscription satisfied");
                }
                Ok(status) => {
                    debug!(
                        user = %user,
                        channel = %channel.id,
                        status = ?status,
                        "Subscription missing"
                    );
                    missing.push(channel);
                }
                Err(e) => {
                    warn!(
                        user = %user,
                        channel = %channel.id,
                        error = %e,
                        "Membership check failed, treating channel as unsubscribed"
                    );
                    missing.push(channel);
                }
            }
        }

        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MembershipStatus;
    use async_trait::async_trait;
    use questline_types::{ChannelId, QuestlineError, Result};
    use std::collections::HashMap;

    struct FakeMembership {
        statuses: HashMap<i64, MembershipStatus>,
        failing: Vec<i64>,
    }

    #[async_trait]
    impl MembershipClient for FakeMembership {
        async fn member_status(&self, chat: ChannelId, _user: UserId) -> Result<MembershipStatus> {
            if self.failing.contains(&chat.as_i64()) {
                return Err(QuestlineError::External("timeout".to_string()));
            }
            Ok(self
                .statuses
                .get(&chat.as_i64())
                .cloned()
                .unwrap_or(MembershipStatus::Left))
        }
    }

    async fn registry_with(ids: &[i64]) -> Arc<ChannelRegistry> {
        let registry = Arc::new(ChannelRegistry::new());
        for id in ids {
            registry
                .add(Channel {
                    id: ChannelId::new(*id),
                    title: format!("channel {}", id),
                    username: None,
                })
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_only_left_channel_reported_in_order() {
        let registry = registry_with(&[-1001, -1002, -1003]).await;
        let client = Arc::new(FakeMembership {
            statuses: HashMap::from([
                (-1001, MembershipStatus::Member),
                (-1002, MembershipStatus::Left),
                (-1003, MembershipStatus::Member),
            ]),
            failing: vec![],
        });

        let verifier = SubscriptionVerifier::new(registry, client);
        let missing = verifier.missing_channels(UserId::new(1)).await;

        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, ChannelId::new(-1002));
    }

    #[tokio::test]
    async fn test_kicked_counts_as_missing() {
        let registry = registry_with(&[-1001]).await;
        let client = Arc::new(FakeMembership {
            statuses: HashMap::from([(-1001, MembershipStatus::Kicked)]),
            failing: vec![],
        });

        let verifier = SubscriptionVerifier::new(registry, client);
        assert_eq!(verifier.missing_channels(UserId::new(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_call_is_fail_closed() {
        let registry = registry_with(&[-1001, -1002]).await;
        let client = Arc::new(FakeMembership {
            statuses: HashMap::from([(-1002, MembershipStatus::Member)]),
            failing: vec![-1001],
        });

        let verifier = SubscriptionVerifier::new(registry, client);
        let missing = verifier.missing_channels(UserId::new(1)).await;

        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, ChannelId::new(-1001));
    }

    #[tokio::test]
    async fn test_order_preserved_when_everything_missing() {
        let registry = registry_with(&[-3, -1, -2]).await;
        let client = Arc::new(FakeMembership {
            statuses: HashMap::new(),
            failing: vec![],
        });

        let verifier = SubscriptionVerifier::new(registry, client);
        let ids: Vec<i64> = verifier
            .missing_channels(UserId::new(1))
            .await
            .into_iter()
            .map(|c| c.id.as_i64())
            .collect();
        assert_eq!(ids, vec![-3, -1, -2]);
    }
}
