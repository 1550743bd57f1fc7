use crate::broadcast::Broadcaster;
use crate::config::NodeConfig;
use anyhow::Result;
use questline_engine::{CompletionEngine, PostbackAdapter};
use questline_ledger::{LedgerManager, MemoryLedgerStorage};
use questline_registry::{ChannelRegistry, NewsFeed, Settings, TaskRegistry, UserDirectory};
use questline_types::UserId;
use questline_verify::{BotApiClient, SubscriptionVerifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStats {
    pub total_users: usize,
    pub active_users: usize,
    pub completed_tasks: usize,
    pub token_circulation: u64,
    pub referrals: usize,
}

/// Wires every component of the reward engine together around one
/// ledger. Construction is cheap; nothing connects out until the first
/// membership check or broadcast.
pub struct QuestlineNode {
    pub config: NodeConfig,
    pub ledger: Arc<LedgerManager>,
    pub users: Arc<UserDirectory>,
    pub tasks: Arc<TaskRegistry>,
    pub channels: Arc<ChannelRegistry>,
    pub settings: Arc<Settings>,
    pub news: Arc<NewsFeed>,
    pub verifier: Arc<SubscriptionVerifier>,
    pub engine: Arc<CompletionEngine>,
    pub postbacks: Arc<PostbackAdapter>,
    pub broadcaster: Arc<Broadcaster>,
}

impl QuestlineNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let ledger = Arc::new(LedgerManager::new(Arc::new(MemoryLedgerStorage::new())));
        let users = Arc::new(UserDirectory::new(ledger.clone()));
        let tasks = Arc::new(TaskRegistry::new());
        let channels = Arc::new(ChannelRegistry::new());
        let settings = Arc::new(Settings::new());
        let news = Arc::new(NewsFeed::new());

        let client = Arc::new(BotApiClient::new(&config.bot.api_base, &config.bot.token)?);
        let verifier = Arc::new(SubscriptionVerifier::new(channels.clone(), client.clone()));

        let engine = Arc::new(CompletionEngine::new(
            users.clone(),
            tasks.clone(),
            ledger.clone(),
        ));
        let postbacks = Arc::new(PostbackAdapter::new(engine.clone(), tasks.clone()));
        let broadcaster = Arc::new(Broadcaster::new(
            client,
            users.clone(),
            config.broadcast.concurrency,
        ));

        info!(name = %config.node.name, "🧩 Node components wired");

        Ok(Self {
            config,
            ledger,
            users,
            tasks,
            channels,
            settings,
            news,
            verifier,
            engine,
            postbacks,
            broadcaster,
        })
    }

    pub fn referral_link(&self, user: UserId) -> String {
        format!(
            "https://t.me/{}?start=ref_{}",
            self.config.bot.username, user
        )
    }

    pub async fn stats(&self) -> Result<NodeStats> {
        let user_stats = self.users.stats().await;
        let circulation = self.ledger.circulating_total().await?;

        Ok(NodeStats {
            total_users: user_stats.total_users,
            active_users: user_stats.active_users,
            completed_tasks: self.tasks.completed_count().await,
            token_circulation: circulation.to_tokens(),
            referrals: user_stats.referrals,
        })
    }
}
