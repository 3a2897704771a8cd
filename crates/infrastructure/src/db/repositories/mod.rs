//! Repository的PostgreSQL实现

use domain::DomainError;

pub mod assignment_repository_impl;
pub mod conversation_repository_impl;
pub mod message_repository_impl;
pub mod notification_repository_impl;
pub mod user_repository_impl;

pub use assignment_repository_impl::PostgresAssignmentRepository;
pub use conversation_repository_impl::PostgresConversationRepository;
pub use message_repository_impl::PostgresMessageRepository;
pub use notification_repository_impl::PostgresNotificationRepository;
pub use user_repository_impl::PostgresUserRepository;

/// 把sqlx错误映射为领域存储错误
pub(crate) fn map_sqlx_err(err: sqlx::Error) -> DomainError {
    DomainError::storage(err.to_string())
}
