//! 消息实体定义
//!
//! 包含消息的核心信息和相关操作。消息一经持久化即不可变，
//! 唯一例外是已读标记（只能由非发送者设置一次）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 消息附件信息
///
/// 附件随消息在同一逻辑操作中创建，之后不再单独修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAttachment {
    /// 附件ID
    pub id: Uuid,
    /// 文件名
    pub file_name: String,
    /// 文件URL
    pub url: String,
    /// MIME类型
    pub mime_type: String,
    /// 文件大小（字节）
    pub size: u64,
}

impl MessageAttachment {
    /// 创建新的消息附件
    pub fn new(
        file_name: impl Into<String>,
        url: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> DomainResult<Self> {
        let file_name = file_name.into();
        let url = url.into();
        let mime_type = mime_type.into();

        if file_name.is_empty() {
            return Err(DomainError::validation_error("file_name", "文件名不能为空"));
        }

        if url.is_empty() {
            return Err(DomainError::validation_error("url", "文件URL不能为空"));
        }

        if mime_type.is_empty() {
            return Err(DomainError::validation_error(
                "mime_type",
                "MIME类型不能为空",
            ));
        }

        // 验证文件大小限制（100MB）
        if size > 100 * 1024 * 1024 {
            return Err(DomainError::validation_error(
                "size",
                "文件大小不能超过100MB",
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            file_name,
            url,
            mime_type,
            size,
        })
    }
}

/// 消息实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 消息唯一ID
    pub id: Uuid,
    /// 所属会话ID
    pub conversation_id: Uuid,
    /// 发送者ID（必须是会话参与者之一）
    pub sender_id: Uuid,
    /// 消息内容（去除首尾空白后非空）
    pub content: String,
    /// 附件列表
    pub attachments: Vec<MessageAttachment>,
    /// 是否已读
    pub is_read: bool,
    /// 阅读时间（至多设置一次）
    pub read_at: Option<DateTime<Utc>>,
    /// 发送时间
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// 创建新消息
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: impl Into<String>,
        attachments: Vec<MessageAttachment>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let content = Self::validate_content(content.into())?;

        Ok(Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            attachments,
            is_read: false,
            read_at: None,
            created_at: now,
        })
    }

    /// 创建具有指定ID的消息（用于从数据库加载）
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        attachments: Vec<MessageAttachment>,
        is_read: bool,
        read_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            content,
            attachments,
            is_read,
            read_at,
            created_at,
        }
    }

    /// 标记为已读（幂等：重复调用不改变 `read_at`）
    pub fn mark_as_read(&mut self, now: DateTime<Utc>) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(now);
        }
    }

    /// 对指定用户而言是否为未读的入站消息
    pub fn is_unread_for(&self, user_id: Uuid) -> bool {
        !self.is_read && self.sender_id != user_id
    }

    /// 获取消息的简短预览（用于通知正文）
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let preview: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{preview}...")
        } else {
            preview
        }
    }

    /// 验证并规整消息内容
    fn validate_content(content: String) -> DomainResult<String> {
        let trimmed = content.trim();

        if trimmed.is_empty() {
            return Err(DomainError::validation_error("content", "消息内容不能为空"));
        }

        if trimmed.chars().count() > 5000 {
            return Err(DomainError::validation_error(
                "content",
                "消息内容不能超过5000个字符",
            ));
        }

        Ok(trimmed.to_owned())
    }
}
