//! 通知实体定义
//!
//! 通知由通知扇出器（或编排器）在领域事件提交后创建，
//! 之后只允许翻转已读状态，核心层永不删除。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 通知类型（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationType {
    /// 预约已创建
    AppointmentCreated,
    /// 预约已更新
    AppointmentUpdated,
    /// 医生申请已接受
    DoctorRequestAccepted,
    /// 医生申请已拒绝
    DoctorRequestRejected,
    /// 健康档案已创建
    RecordCreated,
    /// 健康档案已更新
    RecordUpdated,
    /// 新消息
    NewMessage,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::AppointmentCreated => "appointment_created",
            NotificationType::AppointmentUpdated => "appointment_updated",
            NotificationType::DoctorRequestAccepted => "doctor_request_accepted",
            NotificationType::DoctorRequestRejected => "doctor_request_rejected",
            NotificationType::RecordCreated => "record_created",
            NotificationType::RecordUpdated => "record_updated",
            NotificationType::NewMessage => "new_message",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "appointment_created" => Ok(NotificationType::AppointmentCreated),
            "appointment_updated" => Ok(NotificationType::AppointmentUpdated),
            "doctor_request_accepted" => Ok(NotificationType::DoctorRequestAccepted),
            "doctor_request_rejected" => Ok(NotificationType::DoctorRequestRejected),
            "record_created" => Ok(NotificationType::RecordCreated),
            "record_updated" => Ok(NotificationType::RecordUpdated),
            "new_message" => Ok(NotificationType::NewMessage),
            other => Err(DomainError::validation_error(
                "notification_type",
                format!("未知的通知类型: {other}"),
            )),
        }
    }
}

/// 触发实体的类别标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    Appointment,
    DoctorRequest,
    MedicalRecord,
    Message,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Appointment => "appointment",
            ReferenceKind::DoctorRequest => "doctor_request",
            ReferenceKind::MedicalRecord => "medical_record",
            ReferenceKind::Message => "message",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "appointment" => Ok(ReferenceKind::Appointment),
            "doctor_request" => Ok(ReferenceKind::DoctorRequest),
            "medical_record" => Ok(ReferenceKind::MedicalRecord),
            "message" => Ok(ReferenceKind::Message),
            other => Err(DomainError::validation_error(
                "reference_kind",
                format!("未知的引用类别: {other}"),
            )),
        }
    }
}

/// 指向触发实体的引用（仅供展示，不参与业务逻辑）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReference {
    pub kind: ReferenceKind,
    pub id: Uuid,
}

impl NotificationReference {
    pub fn new(kind: ReferenceKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

/// 通知实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// 通知ID
    pub id: Uuid,
    /// 接收用户ID
    pub user_id: Uuid,
    /// 通知类型
    pub notification_type: NotificationType,
    /// 标题
    pub title: String,
    /// 正文
    pub body: String,
    /// 触发实体引用
    pub reference: NotificationReference,
    /// 是否已读
    pub is_read: bool,
    /// 阅读时间
    pub read_at: Option<DateTime<Utc>>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// 创建新通知
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
        reference: NotificationReference,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            notification_type,
            title: title.into(),
            body: body.into(),
            reference,
            is_read: false,
            read_at: None,
            created_at: now,
        }
    }

    /// 创建具有指定ID的通知（用于从数据库加载）
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: Uuid,
        user_id: Uuid,
        notification_type: NotificationType,
        title: String,
        body: String,
        reference: NotificationReference,
        is_read: bool,
        read_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            notification_type,
            title,
            body,
            reference,
            is_read,
            read_at,
            created_at,
        }
    }

    /// 标记为已读（幂等）
    pub fn mark_as_read(&mut self, now: DateTime<Utc>) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(now);
        }
    }
}
