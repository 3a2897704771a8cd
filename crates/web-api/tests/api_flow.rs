//! Web API 端到端测试
//!
//! 在临时端口上启动完整路由（内存Repository），用 reqwest 驱动
//! REST 端点，用 tokio-tungstenite 驱动 WebSocket 订阅。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

use application::{
    memory::{
        InMemoryAssignmentRepository, InMemoryConversationRepository, InMemoryMessageRepository,
        InMemoryNotificationRepository, InMemoryUserRepository,
    },
    AccessPolicy, EventPublisher, MessageHub, MessagingService, MessagingServiceDependencies,
    NotificationFanout, NotificationHub, SendRateLimiter, SystemClock, TypingCoordinator,
};
use config::JwtConfig;
use domain::{AssignmentRepository, DoctorAssignment, User, UserRepository, UserRole};
use web_api::{router, AppState, JwtService};

struct TestServer {
    base_url: String,
    ws_url: String,
    jwt_service: Arc<JwtService>,
    user_repository: Arc<InMemoryUserRepository>,
    assignment_repository: Arc<InMemoryAssignmentRepository>,
}

async fn start_server() -> TestServer {
    let user_repository = Arc::new(InMemoryUserRepository::new());
    let conversation_repository = Arc::new(InMemoryConversationRepository::new());
    let message_repository = Arc::new(InMemoryMessageRepository::new());
    let notification_repository = Arc::new(InMemoryNotificationRepository::new());
    let assignment_repository = Arc::new(InMemoryAssignmentRepository::new());

    let clock = Arc::new(SystemClock);
    let notification_hub = Arc::new(NotificationHub::new(256));
    let fanout = NotificationFanout::new(
        user_repository.clone(),
        notification_repository.clone(),
        notification_hub.clone(),
        clock.clone(),
    );

    let messaging_service = MessagingService::new(MessagingServiceDependencies {
        user_repository: user_repository.clone(),
        conversation_repository,
        message_repository,
        notification_repository,
        access_policy: Arc::new(AccessPolicy::new(assignment_repository.clone())),
        rate_limiter: Arc::new(SendRateLimiter::new()),
        typing: Arc::new(TypingCoordinator::new(256)),
        message_hub: Arc::new(MessageHub::new(256)),
        notification_hub,
        event_publisher: EventPublisher::new().with_handler(Arc::new(fanout)),
        clock,
    });

    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: "integration-test-secret-key-32-characters-long".to_string(),
        expiration_hours: 1,
    }));
    let state = AppState::new(Arc::new(messaging_service), jwt_service.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{address}/api/v1"),
        ws_url: format!("ws://{address}/api/v1/ws"),
        jwt_service,
        user_repository,
        assignment_repository,
    }
}

impl TestServer {
    fn token_for(&self, user_id: Uuid) -> String {
        self.jwt_service.generate_token(user_id).unwrap()
    }

    /// 创建一对有签约关系的医生和户主
    async fn seed_pair(&self) -> (User, User) {
        let doctor = User::new("王医生", "wang@clinic.cn", UserRole::Doctor, None, Utc::now())
            .unwrap();
        self.user_repository.create(&doctor).await.unwrap();

        let head = User::new(
            "李先生",
            "li@example.com",
            UserRole::FamilyHead,
            Some(Uuid::new_v4()),
            Utc::now(),
        )
        .unwrap();
        self.user_repository.create(&head).await.unwrap();

        let mut assignment =
            DoctorAssignment::new(doctor.id, head.family_id.unwrap(), Utc::now());
        assignment.resolve(true, Utc::now()).unwrap();
        self.assignment_repository.create(&assignment).await.unwrap();

        (doctor, head)
    }
}

#[tokio::test]
async fn test_rest_send_and_read_flow() {
    let server = start_server().await;
    let (doctor, head) = server.seed_pair().await;
    let client = reqwest::Client::new();

    // 医生发送消息
    let response = client
        .post(format!("{}/messages", server.base_url))
        .bearer_auth(server.token_for(doctor.id))
        .json(&json!({ "recipient_id": head.id, "content": "您好，请问最近血压如何？" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let message: Value = response.json().await.unwrap();
    let conversation_id = message["conversation_id"].as_str().unwrap().to_string();

    // 户主的会话列表包含这条会话
    let response = client
        .get(format!("{}/conversations", server.base_url))
        .bearer_auth(server.token_for(head.id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let page: Value = response.json().await.unwrap();
    assert_eq!(page["total_count"], 1);
    assert_eq!(page["items"][0]["id"].as_str().unwrap(), conversation_id);

    // 未读计数为1，整体标记已读后归零
    let response = client
        .get(format!(
            "{}/conversations/{conversation_id}/unread-count",
            server.base_url
        ))
        .bearer_auth(server.token_for(head.id))
        .send()
        .await
        .unwrap();
    let count: Value = response.json().await.unwrap();
    assert_eq!(count["count"], 1);

    let response = client
        .post(format!(
            "{}/conversations/{conversation_id}/read",
            server.base_url
        ))
        .bearer_auth(server.token_for(head.id))
        .send()
        .await
        .unwrap();
    let flipped: Value = response.json().await.unwrap();
    assert_eq!(flipped["count"], 1);

    // 消息事件扇出成了户主的一条通知
    let response = client
        .get(format!("{}/notifications/unread-count", server.base_url))
        .bearer_auth(server.token_for(head.id))
        .send()
        .await
        .unwrap();
    let count: Value = response.json().await.unwrap();
    assert_eq!(count["count"], 1);
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/conversations", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_immediate_resend_returns_429() {
    let server = start_server().await;
    let (doctor, head) = server.seed_pair().await;
    let client = reqwest::Client::new();

    let payload = json!({ "recipient_id": head.id, "content": "第一条" });
    let response = client
        .post(format!("{}/messages", server.base_url))
        .bearer_auth(server.token_for(doctor.id))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = client
        .post(format!("{}/messages", server.base_url))
        .bearer_auth(server.token_for(doctor.id))
        .json(&json!({ "recipient_id": head.id, "content": "第二条" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
}

#[tokio::test]
async fn test_empty_content_returns_400() {
    let server = start_server().await;
    let (doctor, head) = server.seed_pair().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/messages", server.base_url))
        .bearer_auth(server.token_for(doctor.id))
        .json(&json!({ "recipient_id": head.id, "content": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_websocket_receives_message_and_notification() {
    let server = start_server().await;
    let (doctor, head) = server.seed_pair().await;

    // 户主建立订阅连接
    let url = format!("{}?token={}", server.ws_url, server.token_for(head.id));
    let (mut socket, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    // 医生经REST发送消息
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/messages", server.base_url))
        .bearer_auth(server.token_for(doctor.id))
        .json(&json!({ "recipient_id": head.id, "content": "请按时服药" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // 消息帧和通知帧都应到达（两者顺序不保证）
    let mut saw_message = false;
    let mut saw_notification = false;
    while !(saw_message && saw_notification) {
        let frame = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("等待WebSocket帧超时")
            .unwrap()
            .unwrap();
        if let WsMessage::Text(text) = frame {
            let event: Value = serde_json::from_str(&text).unwrap();
            match event["type"].as_str() {
                Some("new_message") => {
                    assert_eq!(event["message"]["content"], "请按时服药");
                    saw_message = true;
                }
                Some("notification") => {
                    assert_eq!(event["notification"]["title"], "新消息");
                    saw_notification = true;
                }
                _ => {}
            }
        }
    }
}

#[tokio::test]
async fn test_websocket_typing_round_trip() {
    let server = start_server().await;
    let (doctor, head) = server.seed_pair().await;
    let client = reqwest::Client::new();

    // 先发一条消息建立会话
    let response = client
        .post(format!("{}/messages", server.base_url))
        .bearer_auth(server.token_for(doctor.id))
        .json(&json!({ "recipient_id": head.id, "content": "您好" }))
        .send()
        .await
        .unwrap();
    let message: Value = response.json().await.unwrap();
    let conversation_id = message["conversation_id"].as_str().unwrap().to_string();

    // 医生订阅该会话的输入状态
    let url = format!(
        "{}?token={}&conversation_id={}",
        server.ws_url,
        server.token_for(doctor.id),
        conversation_id
    );
    let (mut doctor_socket, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    // 户主通过自己的WebSocket连接发送输入状态信号
    let head_url = format!("{}?token={}", server.ws_url, server.token_for(head.id));
    let (mut head_socket, _) = tokio_tungstenite::connect_async(&head_url).await.unwrap();
    head_socket
        .send(WsMessage::Text(
            json!({ "type": "typing", "conversation_id": conversation_id, "is_typing": true })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    // 医生一侧收到typing帧
    loop {
        let frame = timeout(Duration::from_secs(2), doctor_socket.next())
            .await
            .expect("等待typing帧超时")
            .unwrap()
            .unwrap();
        if let WsMessage::Text(text) = frame {
            let event: Value = serde_json::from_str(&text).unwrap();
            if event["type"] == "typing" {
                assert_eq!(event["signal"]["is_typing"], true);
                assert_eq!(event["signal"]["user_id"].as_str().unwrap(), head.id.to_string());
                break;
            }
        }
    }

    // 非参与者订阅该会话的输入状态被拒绝（升级前返回403）
    let outsider = User::new("赵医生", "zhao@clinic.cn", UserRole::Doctor, None, Utc::now())
        .unwrap();
    server.user_repository.create(&outsider).await.unwrap();
    let outsider_url = format!(
        "{}?token={}&conversation_id={}",
        server.ws_url,
        server.token_for(outsider.id),
        conversation_id
    );
    assert!(tokio_tungstenite::connect_async(&outsider_url).await.is_err());
}
