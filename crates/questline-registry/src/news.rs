use chrono::{DateTime, Utc};
use questline_types::{QuestlineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub button_text: Option<String>,
    pub button_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsDraft {
    pub title: String,
    pub content: String,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub button_text: Option<String>,
    pub button_url: Option<String>,
}

/// Operator-published announcements, listed newest first.
pub struct NewsFeed {
    items: Arc<RwLock<Vec<NewsItem>>>,
    next_id: AtomicI64,
}

impl Default for NewsFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl NewsFeed {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn publish(&self, draft: NewsDraft) -> NewsItem {
        let item = NewsItem {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            title: draft.title,
            content: draft.content,
            media_type: draft.media_type,
            media_url: draft.media_url,
            button_text: draft.button_text,
            button_url: draft.button_url,
            created_at: Utc::now(),
        };
        let mut items = self.items.write().await;
        items.push(item.clone());
        item
    }

    pub async fn update(&self, id: i64, draft: NewsDraft) -> Result<NewsItem> {
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| QuestlineError::NotFound(format!("news item {}", id)))?;
        item.title = draft.title;
        item.content = draft.content;
        item.media_type = draft.media_type;
        item.media_url = draft.media_url;
        item.button_text = draft.button_text;
        item.button_url = draft.button_url;
        Ok(item.clone())
    }

    pub async fn remove(&self, id: i64) -> Result<()> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|i| i.id != id);
        if items.len() == before {
            return Err(QuestlineError::NotFound(format!("news item {}", id)));
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<NewsItem> {
        let items = self.items.read().await;
        let mut sorted = items.clone();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> NewsDraft {
        NewsDraft {
            title: title.to_string(),
            content: String::new(),
            media_type: None,
            media_url: None,
            button_text: None,
            button_url: None,
        }
    }

    #[tokio::test]
    async fn test_newest_first() {
        let feed = NewsFeed::new();
        feed.publish(draft("first")).await;
        feed.publish(draft("second")).await;

        let titles: Vec<String> = feed.list().await.into_iter().map(|i| i.title).collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let feed = NewsFeed::new();
        let item = feed.publish(draft("original")).await;

        feed.update(item.id, draft("edited")).await.unwrap();
        assert_eq!(feed.list().await[0].title, "edited");

        feed.remove(item.id).await.unwrap();
        assert!(feed.list().await.is_empty());
        assert!(feed.remove(item.id).await.is_err());
    }
}
