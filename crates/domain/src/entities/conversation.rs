//! 会话实体定义
//!
//! 会话是医生与家庭之间的一对一消息通道。家庭一侧的参与者固定为
//! 该家庭的户主（从家庭信息反范式化而来）。每个 (医生, 户主) 组合
//! 最多只能存在一个会话，由存储层的唯一约束保证。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 会话实体
///
/// 创建后除 `last_activity_at` 外不可变，核心层永不删除会话。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// 会话唯一ID
    pub id: Uuid,
    /// 医生参与者ID
    pub doctor_id: Uuid,
    /// 家庭ID
    pub family_id: Uuid,
    /// 家庭户主ID（家庭一侧的参与者）
    pub family_head_id: Uuid,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最近活动时间（每次接受消息时更新）
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    /// 创建新会话
    pub fn new(
        doctor_id: Uuid,
        family_id: Uuid,
        family_head_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            family_id,
            family_head_id,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// 检查用户是否为会话参与者
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.doctor_id || user_id == self.family_head_id
    }

    /// 获取会话中另一位参与者的ID
    ///
    /// 调用方必须先确认 `user_id` 是参与者。
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.doctor_id {
            Some(self.family_head_id)
        } else if user_id == self.family_head_id {
            Some(self.doctor_id)
        } else {
            None
        }
    }

    /// 更新最近活动时间
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Conversation {
        Conversation::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_participants() {
        let conversation = sample();

        assert!(conversation.is_participant(conversation.doctor_id));
        assert!(conversation.is_participant(conversation.family_head_id));
        assert!(!conversation.is_participant(Uuid::new_v4()));
    }

    #[test]
    fn test_other_participant() {
        let conversation = sample();

        assert_eq!(
            conversation.other_participant(conversation.doctor_id),
            Some(conversation.family_head_id)
        );
        assert_eq!(
            conversation.other_participant(conversation.family_head_id),
            Some(conversation.doctor_id)
        );
        assert_eq!(conversation.other_participant(Uuid::new_v4()), None);
    }

    #[test]
    fn test_touch_updates_last_activity() {
        let mut conversation = sample();
        let later = conversation.last_activity_at + chrono::Duration::seconds(30);

        conversation.touch(later);
        assert_eq!(conversation.last_activity_at, later);
    }
}
