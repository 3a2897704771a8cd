//! 主应用程序入口
//!
//! 启动家庭医生协作平台的 Web API 服务。

use std::sync::Arc;

use application::{
    AccessPolicy, EventPublisher, MessageHub, MessagingService, MessagingServiceDependencies,
    NotificationFanout, NotificationHub, SendRateLimiter, SystemClock, TypingCoordinator,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, PostgresAssignmentRepository, PostgresConversationRepository,
    PostgresMessageRepository, PostgresNotificationRepository, PostgresUserRepository,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 加载并校验配置
    let app_config = AppConfig::from_env_with_defaults();
    app_config.validate()?;

    tracing::info!(
        "连接数据库: {}",
        app_config.database.url.split('@').next_back().unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(&app_config.database.url, app_config.database.max_connections)
        .await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // Repository实例
    let user_repository = Arc::new(PostgresUserRepository::new(pg_pool.clone()));
    let conversation_repository = Arc::new(PostgresConversationRepository::new(pg_pool.clone()));
    let message_repository = Arc::new(PostgresMessageRepository::new(pg_pool.clone()));
    let notification_repository = Arc::new(PostgresNotificationRepository::new(pg_pool.clone()));
    let assignment_repository = Arc::new(PostgresAssignmentRepository::new(pg_pool));

    // 实时通信核心
    let clock = Arc::new(SystemClock);
    let capacity = app_config.broadcast.capacity;
    let message_hub = Arc::new(MessageHub::new(capacity));
    let notification_hub = Arc::new(NotificationHub::new(capacity));
    let typing = Arc::new(TypingCoordinator::new(capacity));
    let rate_limiter = Arc::new(SendRateLimiter::new());
    let access_policy = Arc::new(AccessPolicy::new(assignment_repository));

    // 事件总线：通知扇出器在写入提交后接收领域事件
    let fanout = NotificationFanout::new(
        user_repository.clone(),
        notification_repository.clone(),
        notification_hub.clone(),
        clock.clone(),
    );
    let event_publisher = EventPublisher::new().with_handler(Arc::new(fanout));

    let messaging_service = MessagingService::new(MessagingServiceDependencies {
        user_repository,
        conversation_repository,
        message_repository,
        notification_repository,
        access_policy,
        rate_limiter,
        typing,
        message_hub,
        notification_hub,
        event_publisher,
        clock,
    });

    let jwt_service = Arc::new(JwtService::new(app_config.jwt.clone()));
    let state = AppState::new(Arc::new(messaging_service), jwt_service);

    // 启动 Web 服务器
    let app = router(state);
    let address = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("服务器启动在 http://{address}");
    axum::serve(listener, app).await?;

    Ok(())
}
