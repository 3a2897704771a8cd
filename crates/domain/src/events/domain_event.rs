//! 平台的领域事件
//!
//! 定义在业务写入提交之后发布的事件，支持事件驱动的通知扇出。
//! 预约、签约申请、健康档案的业务服务位于核心之外，事件只携带
//! 通知扇出所需的最小字段。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::message::Message;

/// 预约事件载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEvent {
    /// 预约ID
    pub appointment_id: Uuid,
    /// 医生ID
    pub doctor_id: Uuid,
    /// 家庭ID
    pub family_id: Uuid,
    /// 预约标题
    pub title: String,
    /// 预约时间
    pub scheduled_at: DateTime<Utc>,
}

/// 签约申请事件载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorRequestEvent {
    /// 申请ID
    pub request_id: Uuid,
    /// 医生ID
    pub doctor_id: Uuid,
    /// 医生姓名（用于通知文案）
    pub doctor_name: String,
    /// 家庭ID
    pub family_id: Uuid,
}

/// 健康档案事件载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecordEvent {
    /// 档案ID
    pub record_id: Uuid,
    /// 创建档案的医生ID
    pub doctor_id: Uuid,
    /// 家庭ID
    pub family_id: Uuid,
    /// 档案标题
    pub title: String,
}

/// 领域事件
///
/// 事件只在触发它的写入已经持久化之后发布。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// 预约已创建
    AppointmentCreated { appointment: AppointmentEvent },

    /// 预约已更新
    AppointmentUpdated { appointment: AppointmentEvent },

    /// 签约申请已处理（接受或拒绝）
    DoctorRequestResolved {
        request: DoctorRequestEvent,
        accepted: bool,
    },

    /// 健康档案已创建
    RecordCreated { record: MedicalRecordEvent },

    /// 健康档案已更新
    RecordUpdated { record: MedicalRecordEvent },

    /// 消息已发送
    ///
    /// 携带会话双方的参与者ID，便于订阅端过滤和通知扇出定位接收者。
    MessageSent {
        message: Message,
        doctor_id: Uuid,
        family_head_id: Uuid,
    },
}

impl DomainEvent {
    /// 创建消息发送事件
    pub fn message_sent(message: Message, doctor_id: Uuid, family_head_id: Uuid) -> Self {
        DomainEvent::MessageSent {
            message,
            doctor_id,
            family_head_id,
        }
    }

    /// 创建预约创建事件
    pub fn appointment_created(appointment: AppointmentEvent) -> Self {
        DomainEvent::AppointmentCreated { appointment }
    }

    /// 创建预约更新事件
    pub fn appointment_updated(appointment: AppointmentEvent) -> Self {
        DomainEvent::AppointmentUpdated { appointment }
    }

    /// 创建签约申请处理事件
    pub fn doctor_request_resolved(request: DoctorRequestEvent, accepted: bool) -> Self {
        DomainEvent::DoctorRequestResolved { request, accepted }
    }

    /// 创建档案创建事件
    pub fn record_created(record: MedicalRecordEvent) -> Self {
        DomainEvent::RecordCreated { record }
    }

    /// 创建档案更新事件
    pub fn record_updated(record: MedicalRecordEvent) -> Self {
        DomainEvent::RecordUpdated { record }
    }

    /// 获取事件类型名称
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::AppointmentCreated { .. } => "AppointmentCreated",
            DomainEvent::AppointmentUpdated { .. } => "AppointmentUpdated",
            DomainEvent::DoctorRequestResolved { .. } => "DoctorRequestResolved",
            DomainEvent::RecordCreated { .. } => "RecordCreated",
            DomainEvent::RecordUpdated { .. } => "RecordUpdated",
            DomainEvent::MessageSent { .. } => "MessageSent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_sent_event() {
        let doctor_id = Uuid::new_v4();
        let family_head_id = Uuid::new_v4();
        let message = Message::new(
            Uuid::new_v4(),
            doctor_id,
            "请按时服药",
            vec![],
            Utc::now(),
        )
        .unwrap();

        let event = DomainEvent::message_sent(message.clone(), doctor_id, family_head_id);

        assert_eq!(event.event_type(), "MessageSent");
        match event {
            DomainEvent::MessageSent {
                message: msg,
                doctor_id: did,
                family_head_id: fid,
            } => {
                assert_eq!(msg.id, message.id);
                assert_eq!(did, doctor_id);
                assert_eq!(fid, family_head_id);
            }
            _ => panic!("Expected MessageSent event"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::appointment_created(AppointmentEvent {
            appointment_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            title: "年度体检".to_string(),
            scheduled_at: Utc::now(),
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_type(), event.event_type());
    }
}
