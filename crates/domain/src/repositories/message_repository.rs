//! 消息Repository接口定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::message::{Message, MessageAttachment};
use crate::errors::DomainResult;
use crate::repositories::{PaginatedResult, Pagination};

/// 消息搜索参数
///
/// `conversation_ids` 是调用者有权访问的会话集合，由编排器在查询前解析。
/// 授权过滤发生在分页之前，保证返回的每一页都是满页（除非结果已穷尽）。
#[derive(Debug, Clone, Default)]
pub struct MessageSearchParams {
    /// 关键词（内容子串匹配）
    pub keyword: Option<String>,
    /// 限定单个会话
    pub conversation_id: Option<Uuid>,
    /// 授权会话集合
    pub conversation_ids: Vec<Uuid>,
    /// 起始时间
    pub created_after: Option<DateTime<Utc>>,
    /// 截止时间
    pub created_before: Option<DateTime<Utc>>,
}

/// 消息Repository接口
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 创建新消息（不含附件）
    async fn create(&self, message: &Message) -> DomainResult<Message>;

    /// 为消息追加附件
    ///
    /// 与消息创建属于同一逻辑操作；失败时调用方负责删除孤儿消息。
    async fn add_attachments(
        &self,
        message_id: Uuid,
        attachments: &[MessageAttachment],
    ) -> DomainResult<()>;

    /// 删除消息（用于附件写入失败后的补偿清理）
    async fn delete(&self, message_id: Uuid) -> DomainResult<()>;

    /// 根据ID查找消息（含附件）
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Message>>;

    /// 标记消息为已读（幂等：已读消息不更新时间戳）
    async fn mark_as_read(&self, message_id: Uuid, at: DateTime<Utc>) -> DomainResult<()>;

    /// 批量标记会话内某读者的未读入站消息为已读，返回翻转数量
    async fn mark_conversation_as_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> DomainResult<u64>;

    /// 获取会话消息历史（按发送时间倒序）
    async fn list_by_conversation(
        &self,
        conversation_id: Uuid,
        pagination: Pagination,
    ) -> DomainResult<PaginatedResult<Message>>;

    /// 根据条件搜索消息
    async fn search(
        &self,
        params: &MessageSearchParams,
        pagination: Pagination,
    ) -> DomainResult<PaginatedResult<Message>>;

    /// 统计会话内某读者的未读入站消息数量
    async fn count_unread(&self, conversation_id: Uuid, reader_id: Uuid) -> DomainResult<u64>;
}
