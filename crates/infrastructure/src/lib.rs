//! 基础设施层
//!
//! 提供领域Repository接口的PostgreSQL实现。

pub mod db;

pub use db::repositories::{
    PostgresAssignmentRepository, PostgresConversationRepository, PostgresMessageRepository,
    PostgresNotificationRepository, PostgresUserRepository,
};
pub use db::{create_pg_pool, DbPool};
