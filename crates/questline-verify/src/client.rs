use async_trait::async_trait;
use questline_types::{ChannelId, QuestlineError, Result, UserId};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Bound on every outbound membership/messaging call. An expired call
/// is reported as a failure, never left pending.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Membership status reported by the chat platform for a (chat, user)
/// pair. Only `left` and `kicked` count as unsubscribed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
    Other(String),
}

impl MembershipStatus {
    pub fn from_api(status: &str) -> Self {
        match status {
            "creator" => MembershipStatus::Creator,
            "administrator" => MembershipStatus::Administrator,
            "member" => MembershipStatus::Member,
            "restricted" => MembershipStatus::Restricted,
            "left" => MembershipStatus::Left,
            "kicked" => MembershipStatus::Kicked,
            other => MembershipStatus::Other(other.to_string()),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        !matches!(self, MembershipStatus::Left | MembershipStatus::Kicked)
    }
}

#[async_trait]
pub trait MembershipClient: Send + Sync {
    /// Query the platform for the user's status in one chat. Callers
    /// treat any error as "not subscribed" (fail-closed).
    async fn member_status(&self, chat: ChannelId, user: UserId) -> Result<MembershipStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone)]
pub struct Media {
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct InlineButton {
    pub text: String,
    pub url: String,
}

/// One outbound broadcast message: text plus optional media and an
/// optional inline button.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub text: String,
    pub media: Option<Media>,
    pub button: Option<InlineButton>,
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Best-effort single send. No retry on failure.
    async fn send(&self, chat: UserId, message: &OutboundMessage) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ChatMemberEnvelope {
    ok: bool,
    result: Option<ChatMemberResult>,
}

#[derive(Debug, Deserialize)]
struct ChatMemberResult {
    status: String,
}

#[derive(Debug, Deserialize)]
struct SendEnvelope {
    ok: bool,
}

/// HTTP client for the chat-platform bot API.
pub struct BotApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl BotApiClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| QuestlineError::External(e.to_string()))?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    fn reply_markup(button: &InlineButton) -> String {
        serde_json::json!({
            "inline_keyboard": [[{ "text": button.text, "url": button.url }]]
        })
        .to_string()
    }
}

#[async_trait]
impl MembershipClient for BotApiClient {
    async fn member_status(&self, chat: ChannelId, user: UserId) -> Result<MembershipStatus> {
        let response = self
            .http
            .get(self.method_url("getChatMember"))
            .query(&[
                ("chat_id", chat.as_i64().to_string()),
                ("user_id", user.as_i64().to_string()),
            ])
            .send()
            .await
            .map_err(|e| QuestlineError::External(e.to_string()))?;

        let envelope: ChatMemberEnvelope = response
            .json()
            .await
            .map_err(|e| QuestlineError::External(e.to_string()))?;

        if !envelope.ok {
            return Err(QuestlineError::External(format!(
                "getChatMember returned ok=false for chat {}",
                chat
            )));
        }

        let result = envelope.result.ok_or_else(|| {
            QuestlineError::External("getChatMember response missing result".to_string())
        })?;

        let status = MembershipStatus::from_api(&result.status);
        debug!(chat = %chat, user = %user, status = %result.status, "Membership status fetched");
        Ok(status)
    }
}

#[async_trait]
impl MessageSender for BotApiClient {
    async fn send(&self, chat: UserId, message: &OutboundMessage) -> Result<()> {
        let chat_id = chat.as_i64().to_string();
        let mut params: Vec<(&str, String)> = vec![("chat_id", chat_id)];
        if let Some(button) = &message.button {
            params.push(("reply_markup", Self::reply_markup(button)));
        }

        let method = match &message.media {
            Some(media) => {
                params.push(("caption", message.text.clone()));
                match media.kind {
                    MediaKind::Image => {
                        params.push(("photo", media.url.clone()));
                        "sendPhoto"
                    }
                    MediaKind::Video => {
                        params.push(("video", media.url.clone()));
                        "sendVideo"
                    }
                }
            }
            None => {
                params.push(("text", message.text.clone()));
                "sendMessage"
            }
        };

        let response = self
            .http
            .get(self.method_url(method))
            .query(&params)
            .send()
            .await
            .map_err(|e| QuestlineError::External(e.to_string()))?;

        let envelope: SendEnvelope = response
            .json()
            .await
            .map_err(|e| QuestlineError::External(e.to_string()))?;

        if !envelope.ok {
            return Err(QuestlineError::External(format!(
                "{} returned ok=false for chat {}",
                method, chat
            )));
        }
        Ok(())
    }
}
