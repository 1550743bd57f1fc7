use questline_types::{ChannelId, QuestlineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// A channel the user must be subscribed to before entering the
/// mini-application flow. Owned by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub title: String,
    pub username: Option<String>,
}

impl Channel {
    /// Public join link, preferring the handle when one is set.
    pub fn join_link(&self) -> String {
        match &self.username {
            Some(username) => format!("https://t.me/{}", username),
            None => format!("https://t.me/c/{}", self.id),
        }
    }
}

/// Configured channels in insertion order. The verifier reports missing
/// subscriptions in exactly this order.
pub struct ChannelRegistry {
    channels: Arc<RwLock<Vec<Channel>>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn add(&self, channel: Channel) -> Result<()> {
        if !channel.id.is_valid() {
            return Err(QuestlineError::Validation(
                "channel id must be non-zero".to_string(),
            ));
        }

        let mut channels = self.channels.write().await;
        if channels.iter().any(|c| c.id == channel.id) {
            return Err(QuestlineError::Validation(format!(
                "channel {} already configured",
                channel.id
            )));
        }

        info!(channel = %channel.id, title = %channel.title, "📡 Channel added");
        channels.push(channel);
        Ok(())
    }

    pub async fn update(
        &self,
        id: ChannelId,
        title: String,
        username: Option<String>,
    ) -> Result<Channel> {
        let mut channels = self.channels.write().await;
        let channel = channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| QuestlineError::NotFound(format!("channel {}", id)))?;
        channel.title = title;
        channel.username = username;
        Ok(channel.clone())
    }

    pub async fn remove(&self, id: ChannelId) -> Result<()> {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|c| c.id != id);
        if channels.len() == before {
            return Err(QuestlineError::NotFound(format!("channel {}", id)));
        }
        Ok(())
    }

    pub async fn all(&self) -> Vec<Channel> {
        let channels = self.channels.read().await;
        channels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: i64, title: &str) -> Channel {
        Channel {
            id: ChannelId::new(id),
            title: title.to_string(),
            username: None,
        }
    }

    #[tokio::test]
    async fn test_insertion_order_preserved() {
        let registry = ChannelRegistry::new();
        registry.add(channel(-1003, "third-added")).await.unwrap();
        registry.add(channel(-1001, "first")).await.unwrap();
        registry.add(channel(-1002, "second")).await.unwrap();

        let titles: Vec<String> = registry.all().await.into_iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["third-added", "first", "second"]);
    }

    #[tokio::test]
    async fn test_duplicate_and_zero_ids_rejected() {
        let registry = ChannelRegistry::new();
        registry.add(channel(-1001, "one")).await.unwrap();

        assert!(registry.add(channel(-1001, "dup")).await.is_err());
        assert!(registry.add(channel(0, "zero")).await.is_err());
    }

    #[tokio::test]
    async fn test_join_link() {
        let with_handle = Channel {
            id: ChannelId::new(-1001),
            title: "news".to_string(),
            username: Some("project_news".to_string()),
        };
        assert_eq!(with_handle.join_link(), "https://t.me/project_news");
        assert_eq!(channel(-1002, "private").join_link(), "https://t.me/c/-1002");
    }
}
