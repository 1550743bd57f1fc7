use crate::node::{NodeStats, QuestlineNode};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use questline_registry::{Channel, NewsDraft, NewsItem, TaskDraft};
use questline_types::{
    ChannelId, CompletionStatus, QuestlineError, Rarity, TaskId, TaskType, UserId,
};
use questline_verify::{InlineButton, Media, MediaKind, OutboundMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    node: Arc<QuestlineNode>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize, Deserialize)]
struct OkResponse {
    status: String,
}

impl OkResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            status: "ok".to_string(),
        })
    }
}

fn error_response(e: QuestlineError) -> ApiError {
    let status = match &e {
        QuestlineError::Validation(_)
        | QuestlineError::UnsupportedEvent(_)
        | QuestlineError::TypeMismatch { .. }
        | QuestlineError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
        QuestlineError::NotFound(_) => StatusCode::NOT_FOUND,
        QuestlineError::Unauthorized => StatusCode::UNAUTHORIZED,
        QuestlineError::External(_) => StatusCode::BAD_GATEWAY,
        QuestlineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn require_admin(state: &AppState, admin_id: i64) -> Result<(), ApiError> {
    if admin_id == 0 || admin_id != state.node.config.admin.admin_id {
        return Err(error_response(QuestlineError::Unauthorized));
    }
    Ok(())
}

pub fn router(node: Arc<QuestlineNode>) -> Router {
    let state = AppState { node };

    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/api/validate-subscription", post(validate_subscription))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/complete", post(complete_task))
        .route("/api/postback", post(handle_postback))
        .route("/api/profile", get(get_profile))
        .route("/api/news", get(list_news))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/tasks", post(admin_create_task))
        .route("/admin/tasks/:id/update", post(admin_update_task))
        .route("/admin/tasks/:id/toggle", post(admin_toggle_task))
        .route("/admin/tasks/:id/delete", post(admin_delete_task))
        .route("/admin/channels", post(admin_add_channel))
        .route("/admin/channels/:id/update", post(admin_update_channel))
        .route("/admin/channels/:id/delete", post(admin_delete_channel))
        .route("/admin/news", post(admin_publish_news))
        .route("/admin/news/:id/update", post(admin_update_news))
        .route("/admin/news/:id/delete", post(admin_delete_news))
        .route("/admin/settings", post(admin_update_settings))
        .route("/admin/users/:id", post(admin_update_user))
        .route("/admin/users/:id/tasks/toggle", post(admin_toggle_user_task))
        .route("/admin/broadcasts", post(admin_broadcast))
        .with_state(Arc::new(state))
}

pub fn start_api_server(node: Arc<QuestlineNode>, host: &str, port: u16) -> JoinHandle<()> {
    let app = router(node);
    let addr = format!("{}:{}", host, port);
    info!("Starting API server on {}", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind API server");

        axum::serve(listener, app).await.expect("API server failed");
    })
}

async fn health() -> Json<OkResponse> {
    Json(OkResponse {
        status: "ok".to_string(),
    })
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<NodeStats>, StatusCode> {
    match state.node.stats().await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            error!("Failed to collect node stats: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// --- Mini-app surface ---

#[derive(Deserialize)]
struct ValidateSubscriptionRequest {
    user_id: i64,
    username: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MissingChannelsResponse {
    missing: Vec<Channel>,
}

async fn validate_subscription(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateSubscriptionRequest>,
) -> Result<Json<MissingChannelsResponse>, ApiError> {
    let user = UserId::new(req.user_id);
    state
        .node
        .users
        .ensure_user(user, req.username.as_deref(), None)
        .await
        .map_err(error_response)?;

    let missing = state.node.verifier.missing_channels(user).await;
    Ok(Json(MissingChannelsResponse { missing }))
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: i64,
}

#[derive(Serialize, Deserialize)]
struct TaskView {
    id: TaskId,
    title: String,
    description: String,
    task_type: TaskType,
    rarity: Rarity,
    reward: u64,
    status: Option<CompletionStatus>,
    enabled: Option<bool>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct TaskListResponse {
    tasks: Vec<TaskView>,
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let user = UserId::new(query.user_id);
    state
        .node
        .users
        .ensure_user(user, None, None)
        .await
        .map_err(error_response)?;

    let tasks = state
        .node
        .tasks
        .list_visible_tasks(user)
        .await
        .into_iter()
        .map(|(task, record)| TaskView {
            id: task.id,
            title: task.title,
            description: task.description,
            task_type: task.task_type,
            rarity: task.rarity,
            reward: task.reward,
            status: record.as_ref().map(|r| r.status),
            enabled: record.as_ref().map(|r| r.enabled),
            completed_at: record.as_ref().and_then(|r| r.completed_at),
        })
        .collect();

    Ok(Json(TaskListResponse { tasks }))
}

#[derive(Deserialize)]
struct CompleteTaskRequest {
    user_id: i64,
    task_id: i64,
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompleteTaskRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .node
        .engine
        .complete(UserId::new(req.user_id), TaskId::new(req.task_id))
        .await
        .map_err(error_response)?;
    Ok(OkResponse::ok())
}

#[derive(Deserialize)]
struct PostbackRequest {
    user_id: i64,
    task_id: i64,
    #[serde(default)]
    event: String,
}

async fn handle_postback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PostbackRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .node
        .postbacks
        .handle(UserId::new(req.user_id), TaskId::new(req.task_id), &req.event)
        .await
        .map_err(error_response)?;
    Ok(OkResponse::ok())
}

#[derive(Serialize, Deserialize)]
struct ProfileResponse {
    user_id: UserId,
    username: Option<String>,
    tokens: u64,
    referral_link: String,
    token_rate: String,
    support_link: String,
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = UserId::new(query.user_id);
    let user = state
        .node
        .users
        .ensure_user(user_id, None, None)
        .await
        .map_err(error_response)?;
    let balance = state
        .node
        .ledger
        .balance(user_id)
        .await
        .map_err(error_response)?;

    Ok(Json(ProfileResponse {
        user_id,
        username: user.username,
        tokens: balance.to_tokens(),
        referral_link: state.node.referral_link(user_id),
        token_rate: state.node.settings.token_rate().await,
        support_link: state.node.settings.support_link().await,
    }))
}

#[derive(Serialize, Deserialize)]
struct NewsResponse {
    news: Vec<NewsItem>,
}

async fn list_news(State(state): State<Arc<AppState>>) -> Json<NewsResponse> {
    Json(NewsResponse {
        news: state.node.news.list().await,
    })
}

// --- Operator surface ---

#[derive(Deserialize)]
struct AdminQuery {
    admin_id: i64,
}

async fn admin_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<Json<NodeStats>, ApiError> {
    require_admin(&state, query.admin_id)?;
    state.node.stats().await.map(Json).map_err(|e| {
        error!("Failed to collect node stats: {}", e);
        error_response(QuestlineError::Storage(e.to_string()))
    })
}

fn default_task_type() -> String {
    "registration".to_string()
}

fn default_rarity() -> String {
    "Normal".to_string()
}

fn default_reward() -> u64 {
    15000
}

#[derive(Deserialize)]
struct AdminTaskRequest {
    admin_id: i64,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_task_type")]
    task_type: String,
    #[serde(default = "default_rarity")]
    rarity: String,
    #[serde(default = "default_reward")]
    reward: u64,
}

impl AdminTaskRequest {
    fn draft(&self) -> TaskDraft {
        TaskDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            task_type: TaskType::from(self.task_type.as_str()),
            rarity: Rarity::from(self.rarity.as_str()),
            reward: self.reward,
        }
    }
}

async fn admin_create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminTaskRequest>,
) -> Result<Json<questline_registry::Task>, ApiError> {
    require_admin(&state, req.admin_id)?;
    let task = state
        .node
        .tasks
        .create_task(req.draft())
        .await
        .map_err(error_response)?;
    Ok(Json(task))
}

async fn admin_update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdminTaskRequest>,
) -> Result<Json<questline_registry::Task>, ApiError> {
    require_admin(&state, req.admin_id)?;
    let task = state
        .node
        .tasks
        .update_task(TaskId::new(id), req.draft())
        .await
        .map_err(error_response)?;
    Ok(Json(task))
}

async fn admin_toggle_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdminQuery>,
) -> Result<Json<questline_registry::Task>, ApiError> {
    require_admin(&state, req.admin_id)?;
    let task = state
        .node
        .tasks
        .toggle_task(TaskId::new(id))
        .await
        .map_err(error_response)?;
    Ok(Json(task))
}

async fn admin_delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdminQuery>,
) -> Result<Json<OkResponse>, ApiError> {
    require_admin(&state, req.admin_id)?;
    state
        .node
        .tasks
        .delete_task(TaskId::new(id))
        .await
        .map_err(error_response)?;
    Ok(OkResponse::ok())
}

#[derive(Deserialize)]
struct AdminChannelRequest {
    admin_id: i64,
    channel_id: i64,
    #[serde(default)]
    channel_title: String,
    channel_username: Option<String>,
}

async fn admin_add_channel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminChannelRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    require_admin(&state, req.admin_id)?;
    state
        .node
        .channels
        .add(Channel {
            id: ChannelId::new(req.channel_id),
            title: req.channel_title,
            username: req.channel_username,
        })
        .await
        .map_err(error_response)?;
    Ok(OkResponse::ok())
}

#[derive(Deserialize)]
struct AdminChannelUpdateRequest {
    admin_id: i64,
    #[serde(default)]
    channel_title: String,
    channel_username: Option<String>,
}

async fn admin_update_channel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdminChannelUpdateRequest>,
) -> Result<Json<Channel>, ApiError> {
    require_admin(&state, req.admin_id)?;
    let channel = state
        .node
        .channels
        .update(ChannelId::new(id), req.channel_title, req.channel_username)
        .await
        .map_err(error_response)?;
    Ok(Json(channel))
}

async fn admin_delete_channel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdminQuery>,
) -> Result<Json<OkResponse>, ApiError> {
    require_admin(&state, req.admin_id)?;
    state
        .node
        .channels
        .remove(ChannelId::new(id))
        .await
        .map_err(error_response)?;
    Ok(OkResponse::ok())
}

#[derive(Deserialize)]
struct AdminNewsRequest {
    admin_id: i64,
    title: String,
    #[serde(default)]
    content: String,
    media_type: Option<String>,
    media_url: Option<String>,
    button_text: Option<String>,
    button_url: Option<String>,
}

impl AdminNewsRequest {
    fn draft(&self) -> NewsDraft {
        NewsDraft {
            title: self.title.clone(),
            content: self.content.clone(),
            media_type: self.media_type.clone(),
            media_url: self.media_url.clone(),
            button_text: self.button_text.clone(),
            button_url: self.button_url.clone(),
        }
    }
}

async fn admin_publish_news(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminNewsRequest>,
) -> Result<Json<NewsItem>, ApiError> {
    require_admin(&state, req.admin_id)?;
    Ok(Json(state.node.news.publish(req.draft()).await))
}

async fn admin_update_news(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdminNewsRequest>,
) -> Result<Json<NewsItem>, ApiError> {
    require_admin(&state, req.admin_id)?;
    let item = state
        .node
        .news
        .update(id, req.draft())
        .await
        .map_err(error_response)?;
    Ok(Json(item))
}

async fn admin_delete_news(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdminQuery>,
) -> Result<Json<OkResponse>, ApiError> {
    require_admin(&state, req.admin_id)?;
    state.node.news.remove(id).await.map_err(error_response)?;
    Ok(OkResponse::ok())
}

#[derive(Deserialize)]
struct AdminSettingsRequest {
    admin_id: i64,
    token_rate: String,
    support_link: String,
}

async fn admin_update_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminSettingsRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    require_admin(&state, req.admin_id)?;
    state.node.settings.set("token_rate", &req.token_rate).await;
    state
        .node
        .settings
        .set("support_link", &req.support_link)
        .await;
    Ok(OkResponse::ok())
}

#[derive(Deserialize)]
struct AdminUserUpdateRequest {
    admin_id: i64,
    tokens: u64,
    #[serde(default)]
    is_banned: bool,
}

async fn admin_update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdminUserUpdateRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    require_admin(&state, req.admin_id)?;
    let user = UserId::new(id);
    state
        .node
        .users
        .ensure_user(user, None, None)
        .await
        .map_err(error_response)?;
    state
        .node
        .users
        .adjust_balance(user, req.tokens)
        .await
        .map_err(error_response)?;
    state
        .node
        .users
        .set_banned(user, req.is_banned)
        .await
        .map_err(error_response)?;
    Ok(OkResponse::ok())
}

#[derive(Deserialize)]
struct AdminUserTaskToggleRequest {
    admin_id: i64,
    task_id: i64,
}

async fn admin_toggle_user_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AdminUserTaskToggleRequest>,
) -> Result<Json<questline_registry::UserTask>, ApiError> {
    require_admin(&state, req.admin_id)?;
    let record = state
        .node
        .tasks
        .toggle_user_task(UserId::new(id), TaskId::new(req.task_id))
        .await
        .map_err(error_response)?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct AdminBroadcastRequest {
    admin_id: i64,
    message: String,
    media_type: Option<String>,
    media_url: Option<String>,
    button_text: Option<String>,
    button_url: Option<String>,
}

async fn admin_broadcast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminBroadcastRequest>,
) -> Result<Json<crate::broadcast::BroadcastReport>, ApiError> {
    require_admin(&state, req.admin_id)?;

    let media = match (req.media_type.as_deref(), req.media_url) {
        (Some("image"), Some(url)) => Some(Media {
            kind: MediaKind::Image,
            url,
        }),
        (Some("video"), Some(url)) => Some(Media {
            kind: MediaKind::Video,
            url,
        }),
        _ => None,
    };
    let button = req.button_url.map(|url| InlineButton {
        text: req.button_text.unwrap_or_else(|| "Open".to_string()),
        url,
    });

    let report = state
        .node
        .broadcaster
        .broadcast(OutboundMessage {
            text: req.message,
            media,
            button,
        })
        .await;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                QuestlineError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                QuestlineError::TypeMismatch {
                    event: "deposit".to_string(),
                    task_type: "registration".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                QuestlineError::NotFound("task 9".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (QuestlineError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                QuestlineError::External("timeout".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                QuestlineError::Storage("disk full".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error_response(error).0, expected);
        }
    }

    #[test]
    fn test_task_request_defaults() {
        let req: AdminTaskRequest =
            serde_json::from_str(r#"{"admin_id": 1, "title": "Sign up"}"#).unwrap();
        let draft = req.draft();
        assert_eq!(draft.task_type, TaskType::Registration);
        assert_eq!(draft.rarity, Rarity::Normal);
        assert_eq!(draft.reward, 15000);
    }

    #[tokio::test]
    async fn test_admin_guard() {
        let mut config = NodeConfig::default();
        config.admin.admin_id = 42;
        let state = AppState {
            node: Arc::new(QuestlineNode::new(config).unwrap()),
        };

        assert!(require_admin(&state, 42).is_ok());
        assert!(require_admin(&state, 41).is_err());
        // An unconfigured operator id never grants access.
        assert!(require_admin(&state, 0).is_err());
    }
}
