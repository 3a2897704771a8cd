//! 通知Repository接口定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::notification::Notification;
use crate::errors::DomainResult;
use crate::repositories::{PaginatedResult, Pagination};

/// 通知Repository接口
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// 创建通知
    async fn create(&self, notification: &Notification) -> DomainResult<Notification>;

    /// 根据ID查找通知
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Notification>>;

    /// 获取用户通知列表（按创建时间倒序）
    async fn list_by_user(
        &self,
        user_id: Uuid,
        pagination: Pagination,
        include_read: bool,
    ) -> DomainResult<PaginatedResult<Notification>>;

    /// 获取未读通知数量
    async fn count_unread(&self, user_id: Uuid) -> DomainResult<u64>;

    /// 标记通知为已读（幂等）
    async fn mark_as_read(&self, notification_id: Uuid, at: DateTime<Utc>) -> DomainResult<()>;

    /// 标记用户所有通知为已读，返回翻转数量
    async fn mark_all_as_read(&self, user_id: Uuid, at: DateTime<Utc>) -> DomainResult<u64>;
}
