//! 访问策略
//!
//! 纯谓词逻辑：某个身份是否为会话参与者；医生与家庭之间是否存在
//! 有效签约。无任何副作用，只读外部存储。所有其他组件都依赖这里
//! 的判定结果。

use std::sync::Arc;

use domain::{AssignmentRepository, Conversation, DomainError};
use uuid::Uuid;

use crate::error::ApplicationError;

pub struct AccessPolicy {
    assignment_repository: Arc<dyn AssignmentRepository>,
}

impl AccessPolicy {
    pub fn new(assignment_repository: Arc<dyn AssignmentRepository>) -> Self {
        Self {
            assignment_repository,
        }
    }

    /// 身份是否为会话参与者（医生或该家庭的户主）
    pub fn is_participant(&self, user_id: Uuid, conversation: &Conversation) -> bool {
        conversation.is_participant(user_id)
    }

    /// 医生与家庭之间是否存在有效签约
    ///
    /// 在创建新会话之前、以及任何未锚定到既有会话的消息交换之前调用。
    pub async fn has_active_relationship(
        &self,
        doctor_id: Uuid,
        family_id: Uuid,
    ) -> Result<bool, ApplicationError> {
        let active = self
            .assignment_repository
            .has_active(doctor_id, family_id)
            .await?;
        Ok(active)
    }

    /// 确认参与资格，失败时记录warn日志（可能是探测行为）
    pub fn ensure_participant(
        &self,
        user_id: Uuid,
        conversation: &Conversation,
        action: &str,
    ) -> Result<(), ApplicationError> {
        if self.is_participant(user_id, conversation) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %user_id,
                conversation_id = %conversation.id,
                action,
                "非会话参与者尝试访问会话"
            );
            Err(DomainError::unauthorized(action.to_owned()).into())
        }
    }
}
