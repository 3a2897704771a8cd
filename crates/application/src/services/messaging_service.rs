//! 消息编排服务
//!
//! 实时通信子系统的用例层：校验、授权、持久化、广播，以及会话/
//! 消息/通知的读取路径。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use domain::{
    Conversation, ConversationRepository, DomainError, DomainEvent, Message, MessageAttachment,
    MessageRepository, MessageSearchParams, Notification, NotificationRepository,
    PaginatedResult, Pagination, User, UserRepository, UserRole,
};

use crate::{
    access_policy::AccessPolicy,
    clock::Clock,
    error::ApplicationError,
    event_bus::EventPublisher,
    hub::{ConversationStream, MessageHub, MessagePublished, MessageStream, NotificationHub,
          NotificationStream},
    rate_limiter::SendRateLimiter,
    typing::{TypingCoordinator, TypingStream},
};

/// 待上传的附件描述
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub url: String,
    pub mime_type: String,
    pub size: u64,
}

/// 发送消息请求
#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    /// 已有会话的ID；为None时从双方角色推导医患配对并获取/创建会话
    pub conversation_id: Option<Uuid>,
    pub attachments: Vec<AttachmentUpload>,
}

/// 消息搜索请求
#[derive(Debug, Clone, Default)]
pub struct SearchMessagesRequest {
    pub keyword: Option<String>,
    pub conversation_id: Option<Uuid>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

pub struct MessagingServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub notification_repository: Arc<dyn NotificationRepository>,
    pub access_policy: Arc<AccessPolicy>,
    pub rate_limiter: Arc<SendRateLimiter>,
    pub typing: Arc<TypingCoordinator>,
    pub message_hub: Arc<MessageHub>,
    pub notification_hub: Arc<NotificationHub>,
    pub event_publisher: EventPublisher,
    pub clock: Arc<dyn Clock>,
}

pub struct MessagingService {
    deps: MessagingServiceDependencies,
}

impl MessagingService {
    pub fn new(deps: MessagingServiceDependencies) -> Self {
        Self { deps }
    }

    /// 发送一条消息
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        // 限流门禁：超限是面向用户的"请放慢"信号，不自动重试
        if !self.deps.rate_limiter.can_send(request.sender_id) {
            return Err(DomainError::rate_limited("发送过于频繁，请稍后再试").into());
        }

        if request.content.trim().is_empty() {
            return Err(DomainError::validation_error("content", "消息内容不能为空").into());
        }

        // 解析收发双方身份
        let sender = self.require_user(request.sender_id).await?;
        let recipient = self.require_user(request.recipient_id).await?;

        // 解析会话：锚定已有会话，或从角色推导配对后获取/创建
        let mut conversation = match request.conversation_id {
            Some(conversation_id) => {
                let conversation = self.require_conversation(conversation_id).await?;
                if !conversation.is_participant(sender.id)
                    || !conversation.is_participant(recipient.id)
                {
                    tracing::warn!(
                        sender_id = %sender.id,
                        recipient_id = %recipient.id,
                        conversation_id = %conversation.id,
                        "非会话参与者尝试发送消息"
                    );
                    return Err(DomainError::unauthorized("在该会话中发送消息").into());
                }
                conversation
            }
            None => self.resolve_or_create_conversation(&sender, &recipient).await?,
        };

        // 纵深防御：再次确认发送者参与资格
        self.deps
            .access_policy
            .ensure_participant(sender.id, &conversation, "发送消息")?;

        let attachments = request
            .attachments
            .iter()
            .map(|upload| {
                MessageAttachment::new(
                    upload.file_name.clone(),
                    upload.url.clone(),
                    upload.mime_type.clone(),
                    upload.size,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let now = self.deps.clock.now();
        let message = Message::new(
            conversation.id,
            sender.id,
            request.content,
            attachments,
            now,
        )?;

        self.deps.message_repository.create(&message).await?;

        if !message.attachments.is_empty() {
            if let Err(err) = self
                .deps
                .message_repository
                .add_attachments(message.id, &message.attachments)
                .await
            {
                // 附件写入失败：删除刚创建的消息，不留孤儿数据
                if let Err(cleanup_err) = self.deps.message_repository.delete(message.id).await {
                    tracing::error!(
                        message_id = %message.id,
                        error = %cleanup_err,
                        "清理孤儿消息失败"
                    );
                }
                return Err(DomainError::validation_error(
                    "attachments",
                    format!("附件上传失败: {err}"),
                )
                .into());
            }
        }

        // 更新会话活动时间
        self.deps
            .conversation_repository
            .touch(conversation.id, now)
            .await?;
        conversation.touch(now);

        // 消息已持久化：记录限流、停止输入状态、广播、发布领域事件
        self.deps.rate_limiter.record_sent(sender.id);
        self.deps.typing.stop(conversation.id, sender.id);

        self.deps.message_hub.publish_message(MessagePublished {
            message: message.clone(),
            doctor_id: conversation.doctor_id,
            family_head_id: conversation.family_head_id,
        });
        self.deps
            .message_hub
            .publish_conversation_update(conversation.clone());

        self.deps
            .event_publisher
            .publish(DomainEvent::message_sent(
                message.clone(),
                conversation.doctor_id,
                conversation.family_head_id,
            ))
            .await;

        tracing::info!(
            message_id = %message.id,
            conversation_id = %conversation.id,
            sender_id = %sender.id,
            "消息发送成功"
        );

        Ok(message)
    }

    /// 标记单条消息为已读
    ///
    /// 发送者不能读自己的消息；重复标记是无副作用的幂等操作。
    pub async fn mark_message_as_read(
        &self,
        message_id: Uuid,
        reader_id: Uuid,
    ) -> Result<Message, ApplicationError> {
        let mut message = self
            .deps
            .message_repository
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::resource_not_found("消息", message_id))?;

        if message.sender_id == reader_id {
            return Err(DomainError::validation_error(
                "reader",
                "发送者不能将自己的消息标记为已读",
            )
            .into());
        }

        let conversation = self.require_conversation(message.conversation_id).await?;
        self.deps
            .access_policy
            .ensure_participant(reader_id, &conversation, "标记消息已读")?;

        if message.is_read {
            // 已读消息保持原 read_at，不再落库
            return Ok(message);
        }

        let now = self.deps.clock.now();
        self.deps
            .message_repository
            .mark_as_read(message.id, now)
            .await?;
        message.mark_as_read(now);
        Ok(message)
    }

    /// 批量标记会话内读者的所有未读入站消息，返回翻转数量
    pub async fn mark_conversation_as_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<u64, ApplicationError> {
        let conversation = self.require_conversation(conversation_id).await?;
        self.deps
            .access_policy
            .ensure_participant(reader_id, &conversation, "标记会话已读")?;

        let now = self.deps.clock.now();
        let flipped = self
            .deps
            .message_repository
            .mark_conversation_as_read(conversation_id, reader_id, now)
            .await?;
        Ok(flipped)
    }

    /// 获取会话消息历史
    pub async fn get_conversation_messages(
        &self,
        conversation_id: Uuid,
        caller_id: Uuid,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Message>, ApplicationError> {
        let conversation = self.require_conversation(conversation_id).await?;
        self.deps
            .access_policy
            .ensure_participant(caller_id, &conversation, "读取会话消息")?;

        let result = self
            .deps
            .message_repository
            .list_by_conversation(conversation_id, pagination)
            .await?;
        Ok(result)
    }

    /// 获取调用者参与的会话列表
    pub async fn get_user_conversations(
        &self,
        caller_id: Uuid,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Conversation>, ApplicationError> {
        let result = self
            .deps
            .conversation_repository
            .list_by_participant(caller_id, pagination)
            .await?;
        Ok(result)
    }

    /// 搜索消息
    ///
    /// 授权过滤在分页之前完成：先解析调用者参与的会话集合，
    /// 再把集合作为查询条件下推给存储层。
    pub async fn search_messages(
        &self,
        caller_id: Uuid,
        request: SearchMessagesRequest,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Message>, ApplicationError> {
        let conversation_ids = self
            .deps
            .conversation_repository
            .list_ids_by_participant(caller_id)
            .await?;

        if let Some(conversation_id) = request.conversation_id {
            if !conversation_ids.contains(&conversation_id) {
                tracing::warn!(
                    caller_id = %caller_id,
                    conversation_id = %conversation_id,
                    "尝试搜索无权访问的会话"
                );
                return Err(DomainError::unauthorized("搜索该会话的消息").into());
            }
        }

        if conversation_ids.is_empty() {
            return Ok(PaginatedResult::new(Vec::new(), 0, pagination));
        }

        let params = MessageSearchParams {
            keyword: request.keyword,
            conversation_id: request.conversation_id,
            conversation_ids,
            created_after: request.created_after,
            created_before: request.created_before,
        };
        let result = self.deps.message_repository.search(&params, pagination).await?;
        Ok(result)
    }

    /// 统计会话内调用者的未读入站消息数量
    pub async fn get_conversation_unread_count(
        &self,
        conversation_id: Uuid,
        caller_id: Uuid,
    ) -> Result<u64, ApplicationError> {
        let conversation = self.require_conversation(conversation_id).await?;
        self.deps
            .access_policy
            .ensure_participant(caller_id, &conversation, "读取未读数量")?;

        let count = self
            .deps
            .message_repository
            .count_unread(conversation_id, caller_id)
            .await?;
        Ok(count)
    }

    /// 发送输入状态信号
    pub async fn send_typing_indicator(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    ) -> Result<(), ApplicationError> {
        let conversation = self.require_conversation(conversation_id).await?;
        self.deps
            .access_policy
            .ensure_participant(user_id, &conversation, "发送输入状态")?;

        self.deps.typing.signal(conversation_id, user_id, is_typing);
        Ok(())
    }

    /// 获取调用者的通知列表
    pub async fn get_user_notifications(
        &self,
        caller_id: Uuid,
        pagination: Pagination,
        include_read: bool,
    ) -> Result<PaginatedResult<Notification>, ApplicationError> {
        let result = self
            .deps
            .notification_repository
            .list_by_user(caller_id, pagination, include_read)
            .await?;
        Ok(result)
    }

    /// 获取调用者的未读通知数量
    pub async fn get_unread_notification_count(
        &self,
        caller_id: Uuid,
    ) -> Result<u64, ApplicationError> {
        let count = self
            .deps
            .notification_repository
            .count_unread(caller_id)
            .await?;
        Ok(count)
    }

    /// 标记单条通知为已读（幂等）
    pub async fn mark_notification_as_read(
        &self,
        notification_id: Uuid,
        caller_id: Uuid,
    ) -> Result<Notification, ApplicationError> {
        let mut notification = self
            .deps
            .notification_repository
            .find_by_id(notification_id)
            .await?
            .ok_or_else(|| DomainError::resource_not_found("通知", notification_id))?;

        if notification.user_id != caller_id {
            tracing::warn!(
                caller_id = %caller_id,
                notification_id = %notification_id,
                "尝试操作他人的通知"
            );
            return Err(DomainError::unauthorized("标记该通知已读").into());
        }

        if notification.is_read {
            return Ok(notification);
        }

        let now = self.deps.clock.now();
        self.deps
            .notification_repository
            .mark_as_read(notification.id, now)
            .await?;
        notification.mark_as_read(now);
        Ok(notification)
    }

    /// 标记调用者所有通知为已读，返回翻转数量
    pub async fn mark_all_notifications_as_read(
        &self,
        caller_id: Uuid,
    ) -> Result<u64, ApplicationError> {
        let now = self.deps.clock.now();
        let flipped = self
            .deps
            .notification_repository
            .mark_all_as_read(caller_id, now)
            .await?;
        Ok(flipped)
    }

    /// 订阅发给调用者的消息流
    pub fn subscribe_messages(&self, caller_id: Uuid) -> MessageStream {
        self.deps.message_hub.message_stream(caller_id)
    }

    /// 订阅调用者可见的会话更新流
    pub fn subscribe_conversations(&self, caller_id: Uuid) -> ConversationStream {
        self.deps.message_hub.conversation_stream(caller_id)
    }

    /// 订阅调用者的私有通知流
    pub fn subscribe_notifications(&self, caller_id: Uuid) -> NotificationStream {
        self.deps.notification_hub.subscribe(caller_id)
    }

    /// 订阅某会话的输入状态流（要求调用者是参与者）
    pub async fn subscribe_typing(
        &self,
        conversation_id: Uuid,
        caller_id: Uuid,
    ) -> Result<TypingStream, ApplicationError> {
        let conversation = self.require_conversation(conversation_id).await?;
        self.deps
            .access_policy
            .ensure_participant(caller_id, &conversation, "订阅输入状态")?;
        Ok(self.deps.typing.subscribe(conversation_id))
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::resource_not_found("用户", user_id))?;
        Ok(user)
    }

    async fn require_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Conversation, ApplicationError> {
        let conversation = self
            .deps
            .conversation_repository
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| DomainError::resource_not_found("会话", conversation_id))?;
        Ok(conversation)
    }

    /// 从双方角色推导医患配对，检查签约关系，获取或创建会话
    async fn resolve_or_create_conversation(
        &self,
        sender: &User,
        recipient: &User,
    ) -> Result<Conversation, ApplicationError> {
        // 必须恰好是一名医生和一名家庭户主
        let (doctor, family_head) = match (sender.role, recipient.role) {
            (UserRole::Doctor, UserRole::FamilyHead) => (sender, recipient),
            (UserRole::FamilyHead, UserRole::Doctor) => (recipient, sender),
            _ => {
                return Err(DomainError::validation_error(
                    "participants",
                    "会话双方必须是一名医生和一名家庭户主",
                )
                .into())
            }
        };

        let family_id = family_head.family_id.ok_or_else(|| {
            DomainError::validation_error("family_id", "户主缺少家庭信息")
        })?;

        if !self
            .deps
            .access_policy
            .has_active_relationship(doctor.id, family_id)
            .await?
        {
            tracing::warn!(
                doctor_id = %doctor.id,
                family_id = %family_id,
                "无签约关系的医患尝试建立会话"
            );
            return Err(DomainError::unauthorized("医生与该家庭之间不存在有效签约").into());
        }

        let now = self.deps.clock.now();
        let conversation = self
            .deps
            .conversation_repository
            .get_or_create(Conversation::new(
                doctor.id,
                family_id,
                family_head.id,
                now,
            ))
            .await?;
        Ok(conversation)
    }
}
