//! Repository的内存实现（用于测试和开发环境）
//!
//! 生产环境使用 infrastructure 中的 PostgreSQL 实现。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use domain::{
    AssignmentRepository, Conversation, ConversationRepository, DoctorAssignment, DomainError,
    DomainResult, Message, MessageAttachment, MessageRepository, MessageSearchParams,
    Notification, NotificationRepository, PaginatedResult, Pagination, User, UserRepository,
    UserRole,
};

/// 对排好序的完整结果集应用分页
fn paginate<T>(items: Vec<T>, pagination: Pagination) -> PaginatedResult<T> {
    let total_count = items.len() as u64;
    let start = (pagination.offset() as usize).min(items.len());
    let end = (start + pagination.limit() as usize).min(items.len());
    let page_items = items.into_iter().skip(start).take(end - start).collect();
    PaginatedResult::new(page_items, total_count, pagination)
}

/// 用户Repository内存实现
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> DomainResult<User> {
        let mut users = self.users.write().await;
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn find_family_head(&self, family_id: Uuid) -> DomainResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.family_id == Some(family_id) && user.role == UserRole::FamilyHead)
            .cloned())
    }

    async fn exists(&self, id: Uuid) -> DomainResult<bool> {
        let users = self.users.read().await;
        Ok(users.contains_key(&id))
    }
}

/// 会话Repository内存实现
#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<Uuid, Conversation>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id).cloned())
    }

    async fn find_by_pair(
        &self,
        doctor_id: Uuid,
        family_head_id: Uuid,
    ) -> DomainResult<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .find(|c| c.doctor_id == doctor_id && c.family_head_id == family_head_id)
            .cloned())
    }

    async fn get_or_create(&self, conversation: Conversation) -> DomainResult<Conversation> {
        // 整个检查-插入过程持有写锁，并发调用同一组合不会产生重复会话
        let mut conversations = self.conversations.write().await;
        if let Some(existing) = conversations.values().find(|c| {
            c.doctor_id == conversation.doctor_id
                && c.family_head_id == conversation.family_head_id
        }) {
            return Ok(existing.clone());
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn list_by_participant(
        &self,
        user_id: Uuid,
        pagination: Pagination,
    ) -> DomainResult<PaginatedResult<Conversation>> {
        let conversations = self.conversations.read().await;
        let mut items: Vec<Conversation> = conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(paginate(items, pagination))
    }

    async fn list_ids_by_participant(&self, user_id: Uuid) -> DomainResult<Vec<Uuid>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .map(|c| c.id)
            .collect())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(&id)
            .ok_or_else(|| DomainError::resource_not_found("会话", id))?;
        conversation.touch(at);
        Ok(())
    }
}

/// 消息Repository内存实现
///
/// `fail_attachments` 用于在测试中模拟附件存储故障，
/// 验证编排器的补偿清理路径。
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<Uuid, Message>>,
    fail_attachments: AtomicBool,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 故障注入：让后续的附件写入失败
    pub fn set_fail_attachments(&self, fail: bool) {
        self.fail_attachments.store(fail, Ordering::SeqCst);
    }

    /// 当前存储的消息数量（测试断言用）
    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: &Message) -> DomainResult<Message> {
        let mut messages = self.messages.write().await;
        // 附件由 add_attachments 单独落库
        let mut stored = message.clone();
        stored.attachments = Vec::new();
        messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn add_attachments(
        &self,
        message_id: Uuid,
        attachments: &[MessageAttachment],
    ) -> DomainResult<()> {
        if self.fail_attachments.load(Ordering::SeqCst) {
            return Err(DomainError::storage("附件存储不可用"));
        }

        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(&message_id)
            .ok_or_else(|| DomainError::resource_not_found("消息", message_id))?;
        message.attachments.extend_from_slice(attachments);
        Ok(())
    }

    async fn delete(&self, message_id: Uuid) -> DomainResult<()> {
        let mut messages = self.messages.write().await;
        messages.remove(&message_id);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.get(&id).cloned())
    }

    async fn mark_as_read(&self, message_id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(&message_id)
            .ok_or_else(|| DomainError::resource_not_found("消息", message_id))?;
        message.mark_as_read(at);
        Ok(())
    }

    async fn mark_conversation_as_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let mut messages = self.messages.write().await;
        let mut flipped = 0;
        for message in messages.values_mut() {
            if message.conversation_id == conversation_id && message.is_unread_for(reader_id) {
                message.mark_as_read(at);
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: Uuid,
        pagination: Pagination,
    ) -> DomainResult<PaginatedResult<Message>> {
        let messages = self.messages.read().await;
        let mut items: Vec<Message> = messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(items, pagination))
    }

    async fn search(
        &self,
        params: &MessageSearchParams,
        pagination: Pagination,
    ) -> DomainResult<PaginatedResult<Message>> {
        let messages = self.messages.read().await;
        let mut items: Vec<Message> = messages
            .values()
            .filter(|m| params.conversation_ids.contains(&m.conversation_id))
            .filter(|m| {
                params
                    .conversation_id
                    .map(|id| m.conversation_id == id)
                    .unwrap_or(true)
            })
            .filter(|m| {
                params
                    .keyword
                    .as_deref()
                    .map(|keyword| m.content.contains(keyword))
                    .unwrap_or(true)
            })
            .filter(|m| {
                params
                    .created_after
                    .map(|after| m.created_at >= after)
                    .unwrap_or(true)
            })
            .filter(|m| {
                params
                    .created_before
                    .map(|before| m.created_at <= before)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(items, pagination))
    }

    async fn count_unread(&self, conversation_id: Uuid, reader_id: Uuid) -> DomainResult<u64> {
        let messages = self.messages.read().await;
        Ok(messages
            .values()
            .filter(|m| m.conversation_id == conversation_id && m.is_unread_for(reader_id))
            .count() as u64)
    }
}

/// 通知Repository内存实现
#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<HashMap<Uuid, Notification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn create(&self, notification: &Notification) -> DomainResult<Notification> {
        let mut notifications = self.notifications.write().await;
        notifications.insert(notification.id, notification.clone());
        Ok(notification.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications.get(&id).cloned())
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        pagination: Pagination,
        include_read: bool,
    ) -> DomainResult<PaginatedResult<Notification>> {
        let notifications = self.notifications.read().await;
        let mut items: Vec<Notification> = notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .filter(|n| include_read || !n.is_read)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(items, pagination))
    }

    async fn count_unread(&self, user_id: Uuid) -> DomainResult<u64> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as u64)
    }

    async fn mark_as_read(&self, notification_id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&notification_id)
            .ok_or_else(|| DomainError::resource_not_found("通知", notification_id))?;
        notification.mark_as_read(at);
        Ok(())
    }

    async fn mark_all_as_read(&self, user_id: Uuid, at: DateTime<Utc>) -> DomainResult<u64> {
        let mut notifications = self.notifications.write().await;
        let mut flipped = 0;
        for notification in notifications.values_mut() {
            if notification.user_id == user_id && !notification.is_read {
                notification.mark_as_read(at);
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

/// 签约Repository内存实现
#[derive(Default)]
pub struct InMemoryAssignmentRepository {
    assignments: RwLock<HashMap<Uuid, DoctorAssignment>>,
}

impl InMemoryAssignmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn create(&self, assignment: &DoctorAssignment) -> DomainResult<DoctorAssignment> {
        let mut assignments = self.assignments.write().await;
        assignments.insert(assignment.id, assignment.clone());
        Ok(assignment.clone())
    }

    async fn find_by_pair(
        &self,
        doctor_id: Uuid,
        family_id: Uuid,
    ) -> DomainResult<Option<DoctorAssignment>> {
        let assignments = self.assignments.read().await;
        Ok(assignments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.family_id == family_id)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn has_active(&self, doctor_id: Uuid, family_id: Uuid) -> DomainResult<bool> {
        let assignments = self.assignments.read().await;
        Ok(assignments
            .values()
            .any(|a| a.doctor_id == doctor_id && a.family_id == family_id && a.is_active()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let repository = InMemoryConversationRepository::new();
        let doctor_id = Uuid::new_v4();
        let family_id = Uuid::new_v4();
        let family_head_id = Uuid::new_v4();

        let first = repository
            .get_or_create(Conversation::new(
                doctor_id,
                family_id,
                family_head_id,
                Utc::now(),
            ))
            .await
            .unwrap();
        let second = repository
            .get_or_create(Conversation::new(
                doctor_id,
                family_id,
                family_head_id,
                Utc::now(),
            ))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_mark_conversation_as_read_only_flips_incoming() {
        let repository = InMemoryMessageRepository::new();
        let conversation_id = Uuid::new_v4();
        let doctor_id = Uuid::new_v4();
        let family_head_id = Uuid::new_v4();

        let incoming =
            Message::new(conversation_id, doctor_id, "您好", vec![], Utc::now()).unwrap();
        let outgoing =
            Message::new(conversation_id, family_head_id, "医生好", vec![], Utc::now()).unwrap();
        repository.create(&incoming).await.unwrap();
        repository.create(&outgoing).await.unwrap();

        // 户主读取会话：只翻转医生发来的那条
        let flipped = repository
            .mark_conversation_as_read(conversation_id, family_head_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(flipped, 1);

        let stored = repository.find_by_id(incoming.id).await.unwrap().unwrap();
        assert!(stored.is_read);
        let own = repository.find_by_id(outgoing.id).await.unwrap().unwrap();
        assert!(!own.is_read);
    }

    #[tokio::test]
    async fn test_search_respects_authorized_set() {
        let repository = InMemoryMessageRepository::new();
        let allowed = Uuid::new_v4();
        let forbidden = Uuid::new_v4();

        let visible = Message::new(allowed, Uuid::new_v4(), "血压偏高", vec![], Utc::now()).unwrap();
        let hidden =
            Message::new(forbidden, Uuid::new_v4(), "血压正常", vec![], Utc::now()).unwrap();
        repository.create(&visible).await.unwrap();
        repository.create(&hidden).await.unwrap();

        let params = MessageSearchParams {
            keyword: Some("血压".to_string()),
            conversation_ids: vec![allowed],
            ..Default::default()
        };
        let result = repository
            .search(&params, Pagination::default_page())
            .await
            .unwrap();

        assert_eq!(result.total_count, 1);
        assert_eq!(result.items[0].id, visible.id);
    }
}
