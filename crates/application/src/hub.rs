//! 广播中枢
//!
//! 基于 tokio broadcast 通道的进程内多播：一个发布端，多个互相独立
//! 的订阅端，每个订阅端带自己的过滤谓词。发布是尽力而为的——消息
//! 的持久化在发布之前已经完成，丢失一条实时推送只会延迟客户端的
//! 最终一致（下次轮询或重连时补齐），因此发布失败只记日志不上抛。
//!
//! 背压策略：通道是固定容量的环形缓冲，订阅者消费过慢时丢弃最旧
//! 事件（收到 Lagged 后记警告并继续）。

use tokio::sync::broadcast;
use uuid::Uuid;

use domain::{Conversation, Message, Notification};

/// 消息广播载荷
///
/// 附带会话双方参与者ID，订阅端无需回查存储即可完成访问过滤。
#[derive(Debug, Clone)]
pub struct MessagePublished {
    pub message: Message,
    pub doctor_id: Uuid,
    pub family_head_id: Uuid,
}

impl MessagePublished {
    /// 消息对指定身份是否可见：必须是会话参与者，且不是发送者本人
    /// （发送者不会收到自己消息的回显）。
    fn is_visible_to(&self, user_id: Uuid) -> bool {
        (user_id == self.doctor_id || user_id == self.family_head_id)
            && user_id != self.message.sender_id
    }
}

/// 消息与会话更新的广播中枢
pub struct MessageHub {
    messages: broadcast::Sender<MessagePublished>,
    conversations: broadcast::Sender<Conversation>,
}

impl MessageHub {
    pub fn new(capacity: usize) -> Self {
        let (messages, _) = broadcast::channel(capacity);
        let (conversations, _) = broadcast::channel(capacity);
        Self {
            messages,
            conversations,
        }
    }

    /// 广播一条新消息
    pub fn publish_message(&self, published: MessagePublished) {
        if self.messages.receiver_count() == 0 {
            return;
        }
        if let Err(err) = self.messages.send(published) {
            tracing::warn!(error = %err, "消息广播失败");
        }
    }

    /// 广播一次会话元数据更新
    pub fn publish_conversation_update(&self, conversation: Conversation) {
        if self.conversations.receiver_count() == 0 {
            return;
        }
        if let Err(err) = self.conversations.send(conversation) {
            tracing::warn!(error = %err, "会话更新广播失败");
        }
    }

    /// 订阅发给指定身份的消息流
    pub fn message_stream(&self, user_id: Uuid) -> MessageStream {
        MessageStream {
            receiver: self.messages.subscribe(),
            user_id,
        }
    }

    /// 订阅指定身份可见的会话更新流
    pub fn conversation_stream(&self, user_id: Uuid) -> ConversationStream {
        ConversationStream {
            receiver: self.conversations.subscribe(),
            user_id,
        }
    }
}

/// 按身份过滤的消息流
pub struct MessageStream {
    receiver: broadcast::Receiver<MessagePublished>,
    user_id: Uuid,
}

impl MessageStream {
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(published) if published.is_visible_to(self.user_id) => {
                    return Some(published.message)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        skipped,
                        "消息订阅者消费过慢，跳过旧事件"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// 按身份过滤的会话更新流
pub struct ConversationStream {
    receiver: broadcast::Receiver<Conversation>,
    user_id: Uuid,
}

impl ConversationStream {
    pub async fn recv(&mut self) -> Option<Conversation> {
        loop {
            match self.receiver.recv().await {
                Ok(conversation) if conversation.is_participant(self.user_id) => {
                    return Some(conversation)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        skipped,
                        "会话订阅者消费过慢，跳过旧事件"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// 通知广播中枢
///
/// 全部用户共享同一个中枢，过滤发生在订阅端而不是按主题分通道。
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 广播一条新通知
    pub fn publish(&self, notification: Notification) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        if let Err(err) = self.sender.send(notification) {
            tracing::warn!(error = %err, "通知广播失败");
        }
    }

    /// 订阅指定用户的私有通知流
    pub fn subscribe(&self, user_id: Uuid) -> NotificationStream {
        NotificationStream {
            receiver: self.sender.subscribe(),
            user_id,
        }
    }
}

/// 单个用户的通知流
pub struct NotificationStream {
    receiver: broadcast::Receiver<Notification>,
    user_id: Uuid,
}

impl NotificationStream {
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) if notification.user_id == self.user_id => {
                    return Some(notification)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        skipped,
                        "通知订阅者消费过慢，跳过旧事件"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{NotificationReference, NotificationType, ReferenceKind};
    use std::time::Duration;
    use tokio::time::timeout;

    fn make_published(doctor_id: Uuid, family_head_id: Uuid, sender_id: Uuid) -> MessagePublished {
        let message = Message::new(Uuid::new_v4(), sender_id, "检查结果正常", vec![], Utc::now())
            .unwrap();
        MessagePublished {
            message,
            doctor_id,
            family_head_id,
        }
    }

    #[tokio::test]
    async fn test_message_stream_delivers_to_other_participant() {
        let hub = MessageHub::new(64);
        let doctor_id = Uuid::new_v4();
        let family_head_id = Uuid::new_v4();

        let mut stream = hub.message_stream(family_head_id);
        hub.publish_message(make_published(doctor_id, family_head_id, doctor_id));

        let message = timeout(Duration::from_millis(200), stream.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.sender_id, doctor_id);
    }

    #[tokio::test]
    async fn test_sender_never_receives_own_echo() {
        let hub = MessageHub::new(64);
        let doctor_id = Uuid::new_v4();
        let family_head_id = Uuid::new_v4();

        let mut sender_stream = hub.message_stream(doctor_id);
        hub.publish_message(make_published(doctor_id, family_head_id, doctor_id));

        let result = timeout(Duration::from_millis(150), sender_stream.recv()).await;
        assert!(result.is_err(), "发送者不应收到自己消息的回显");
    }

    #[tokio::test]
    async fn test_outsider_never_receives_message() {
        let hub = MessageHub::new(64);
        let doctor_id = Uuid::new_v4();
        let family_head_id = Uuid::new_v4();

        let mut outsider_stream = hub.message_stream(Uuid::new_v4());
        hub.publish_message(make_published(doctor_id, family_head_id, doctor_id));

        let result = timeout(Duration::from_millis(150), outsider_stream.recv()).await;
        assert!(result.is_err(), "非参与者不应收到消息");
    }

    #[tokio::test]
    async fn test_conversation_stream_filters_by_participant() {
        let hub = MessageHub::new(64);
        let conversation =
            Conversation::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Utc::now());

        let mut participant_stream = hub.conversation_stream(conversation.doctor_id);
        let mut outsider_stream = hub.conversation_stream(Uuid::new_v4());

        hub.publish_conversation_update(conversation.clone());

        let received = timeout(Duration::from_millis(200), participant_stream.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, conversation.id);

        let result = timeout(Duration::from_millis(150), outsider_stream.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_notification_stream_is_private() {
        let hub = NotificationHub::new(64);
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        let mut stream_a = hub.subscribe(user_a);
        let mut stream_b = hub.subscribe(user_b);

        let notification = Notification::new(
            user_a,
            NotificationType::NewMessage,
            "新消息",
            "王医生: 您好",
            NotificationReference::new(ReferenceKind::Message, Uuid::new_v4()),
            Utc::now(),
        );
        hub.publish(notification.clone());

        let received = timeout(Duration::from_millis(200), stream_a.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, notification.id);

        let result = timeout(Duration::from_millis(150), stream_b.recv()).await;
        assert!(result.is_err(), "通知只能发给所属用户");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = MessageHub::new(64);
        // 没有订阅者时发布不应panic也不应报错
        hub.publish_message(make_published(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()));
        hub.publish_conversation_update(Conversation::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
        ));
    }
}
