//! 会话Repository接口定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::conversation::Conversation;
use crate::errors::DomainResult;
use crate::repositories::{PaginatedResult, Pagination};

/// 会话Repository接口
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 根据ID查找会话
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Conversation>>;

    /// 根据 (医生, 户主) 组合查找会话
    async fn find_by_pair(
        &self,
        doctor_id: Uuid,
        family_head_id: Uuid,
    ) -> DomainResult<Option<Conversation>>;

    /// 获取或创建 (医生, 户主) 组合的会话
    ///
    /// 实现必须保证原子性：并发调用同一组合不得产生重复会话。
    async fn get_or_create(&self, conversation: Conversation) -> DomainResult<Conversation>;

    /// 获取用户参与的会话列表（按最近活动倒序）
    async fn list_by_participant(
        &self,
        user_id: Uuid,
        pagination: Pagination,
    ) -> DomainResult<PaginatedResult<Conversation>>;

    /// 获取用户参与的所有会话ID（用于搜索授权过滤）
    async fn list_ids_by_participant(&self, user_id: Uuid) -> DomainResult<Vec<Uuid>>;

    /// 更新会话的最近活动时间
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()>;
}
