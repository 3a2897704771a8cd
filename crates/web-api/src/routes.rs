use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use application::{AttachmentUpload, SearchMessagesRequest, SendMessageRequest};
use domain::{Conversation, Message, Notification, PaginatedResult, Pagination};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

/// 单页条数上限
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    file_name: String,
    url: String,
    mime_type: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    recipient_id: Uuid,
    content: String,
    conversation_id: Option<Uuid>,
    #[serde(default)]
    attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
struct TypingPayload {
    is_typing: bool,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    page_size: Option<u32>,
}

impl PageQuery {
    fn pagination(&self) -> Pagination {
        Pagination::new(
            self.page.unwrap_or(0),
            self.page_size.unwrap_or(20).min(MAX_PAGE_SIZE),
        )
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    keyword: Option<String>,
    conversation_id: Option<Uuid>,
    created_after: Option<DateTime<Utc>>,
    created_before: Option<DateTime<Utc>>,
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    include_read: Option<bool>,
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
    /// 给定时同时订阅该会话的输入状态信号
    conversation_id: Option<Uuid>,
}

/// 分页响应
#[derive(Debug, Serialize)]
struct PageResponse<T> {
    items: Vec<T>,
    total_count: u64,
    page: u32,
    page_size: u32,
    has_more: bool,
}

impl<T> From<PaginatedResult<T>> for PageResponse<T> {
    fn from(result: PaginatedResult<T>) -> Self {
        Self {
            items: result.items,
            total_count: result.total_count,
            page: result.page,
            page_size: result.page_size,
            has_more: result.has_more,
        }
    }
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/messages", post(send_message))
        .route("/messages/search", get(search_messages))
        .route("/messages/{message_id}/read", post(mark_message_read))
        .route("/conversations", get(get_conversations))
        .route(
            "/conversations/{conversation_id}/messages",
            get(get_conversation_messages),
        )
        .route(
            "/conversations/{conversation_id}/read",
            post(mark_conversation_read),
        )
        .route(
            "/conversations/{conversation_id}/typing",
            post(send_typing_indicator),
        )
        .route(
            "/conversations/{conversation_id}/unread-count",
            get(get_conversation_unread_count),
        )
        .route("/notifications", get(get_notifications))
        .route(
            "/notifications/unread-count",
            get(get_notification_unread_count),
        )
        .route(
            "/notifications/{notification_id}/read",
            post(mark_notification_read),
        )
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;

    let message = state
        .messaging_service
        .send_message(SendMessageRequest {
            sender_id: caller_id,
            recipient_id: payload.recipient_id,
            content: payload.content,
            conversation_id: payload.conversation_id,
            attachments: payload
                .attachments
                .into_iter()
                .map(|a| AttachmentUpload {
                    file_name: a.file_name,
                    url: a.url,
                    mime_type: a.mime_type,
                    size: a.size,
                })
                .collect(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_message_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Message>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let message = state
        .messaging_service
        .mark_message_as_read(message_id, caller_id)
        .await?;
    Ok(Json(message))
}

async fn search_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PageResponse<Message>>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let pagination = Pagination::new(
        query.page.unwrap_or(0),
        query.page_size.unwrap_or(20).min(MAX_PAGE_SIZE),
    );

    let result = state
        .messaging_service
        .search_messages(
            caller_id,
            SearchMessagesRequest {
                keyword: query.keyword,
                conversation_id: query.conversation_id,
                created_after: query.created_after,
                created_before: query.created_before,
            },
            pagination,
        )
        .await?;
    Ok(Json(result.into()))
}

async fn get_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<Conversation>>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let result = state
        .messaging_service
        .get_user_conversations(caller_id, query.pagination())
        .await?;
    Ok(Json(result.into()))
}

async fn get_conversation_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<Message>>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let result = state
        .messaging_service
        .get_conversation_messages(conversation_id, caller_id, query.pagination())
        .await?;
    Ok(Json(result.into()))
}

async fn mark_conversation_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<CountResponse>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let count = state
        .messaging_service
        .mark_conversation_as_read(conversation_id, caller_id)
        .await?;
    Ok(Json(CountResponse { count }))
}

async fn send_typing_indicator(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<TypingPayload>,
) -> Result<StatusCode, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    state
        .messaging_service
        .send_typing_indicator(conversation_id, caller_id, payload.is_typing)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_conversation_unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<CountResponse>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let count = state
        .messaging_service
        .get_conversation_unread_count(conversation_id, caller_id)
        .await?;
    Ok(Json(CountResponse { count }))
}

async fn get_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<PageResponse<Notification>>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let pagination = Pagination::new(
        query.page.unwrap_or(0),
        query.page_size.unwrap_or(20).min(MAX_PAGE_SIZE),
    );
    let result = state
        .messaging_service
        .get_user_notifications(caller_id, pagination, query.include_read.unwrap_or(true))
        .await?;
    Ok(Json(result.into()))
}

async fn get_notification_unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let count = state
        .messaging_service
        .get_unread_notification_count(caller_id)
        .await?;
    Ok(Json(CountResponse { count }))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let notification = state
        .messaging_service
        .mark_notification_as_read(notification_id, caller_id)
        .await?;
    Ok(Json(notification))
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, ApiError> {
    let caller_id = state.jwt_service.authenticate(&headers)?;
    let count = state
        .messaging_service
        .mark_all_notifications_as_read(caller_id)
        .await?;
    Ok(Json(CountResponse { count }))
}

/// WebSocket 订阅端点
///
/// 升级前完成身份校验和（可选的）输入状态订阅授权，
/// 未授权的请求不会进入升级流程。
async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let claims = state.jwt_service.validate_token(&query.token)?;
    let user_id = claims.user_id;

    let typing_stream = match query.conversation_id {
        Some(conversation_id) => Some(
            state
                .messaging_service
                .subscribe_typing(conversation_id, user_id)
                .await?,
        ),
        None => None,
    };

    let connection = WebSocketConnection::new(state, user_id, typing_stream);
    Ok(ws.on_upgrade(move |socket| connection.run(socket)))
}
