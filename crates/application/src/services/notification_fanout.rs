//! 通知扇出器
//!
//! 监听已提交的领域事件，把每个事件转换成面向接收者的通知：
//! 构造通知、持久化、再经通知中枢广播。任何一步失败都只记录
//! 日志——事件源头的事务早已提交，扇出失败不得使其失效。

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use domain::{
    AppointmentEvent, DoctorRequestEvent, DomainEvent, MedicalRecordEvent, Notification,
    NotificationReference, NotificationRepository, NotificationType, ReferenceKind,
    UserRepository,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    event_bus::EventHandler,
    hub::NotificationHub,
};

pub struct NotificationFanout {
    user_repository: Arc<dyn UserRepository>,
    notification_repository: Arc<dyn NotificationRepository>,
    notification_hub: Arc<NotificationHub>,
    clock: Arc<dyn Clock>,
}

impl NotificationFanout {
    pub fn new(
        user_repository: Arc<dyn UserRepository>,
        notification_repository: Arc<dyn NotificationRepository>,
        notification_hub: Arc<NotificationHub>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            user_repository,
            notification_repository,
            notification_hub,
            clock,
        }
    }

    /// 创建一条通知：先持久化，再广播
    async fn notify(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
        reference: NotificationReference,
    ) -> Result<(), ApplicationError> {
        let notification = Notification::new(
            user_id,
            notification_type,
            title,
            body,
            reference,
            self.clock.now(),
        );
        self.notification_repository.create(&notification).await?;
        self.notification_hub.publish(notification);
        Ok(())
    }

    /// 解析家庭户主；家庭没有户主时记录告警并返回None
    async fn resolve_family_head(&self, family_id: Uuid) -> Result<Option<Uuid>, ApplicationError> {
        let head = self.user_repository.find_family_head(family_id).await?;
        if head.is_none() {
            tracing::warn!(family_id = %family_id, "家庭没有户主，跳过通知");
        }
        Ok(head.map(|user| user.id))
    }

    /// 预约事件：医生和家庭户主都会收到通知
    async fn handle_appointment(
        &self,
        appointment: &AppointmentEvent,
        notification_type: NotificationType,
        title: &str,
    ) -> Result<(), ApplicationError> {
        let reference =
            NotificationReference::new(ReferenceKind::Appointment, appointment.appointment_id);
        let body = format!(
            "{}（{}）",
            appointment.title,
            appointment.scheduled_at.format("%Y-%m-%d %H:%M")
        );

        self.notify(
            appointment.doctor_id,
            notification_type,
            title,
            body.clone(),
            reference,
        )
        .await?;

        if let Some(family_head_id) = self.resolve_family_head(appointment.family_id).await? {
            self.notify(family_head_id, notification_type, title, body, reference)
                .await?;
        }
        Ok(())
    }

    /// 签约申请事件：只通知家庭户主
    async fn handle_doctor_request(
        &self,
        request: &DoctorRequestEvent,
        accepted: bool,
    ) -> Result<(), ApplicationError> {
        let Some(family_head_id) = self.resolve_family_head(request.family_id).await? else {
            return Ok(());
        };

        let (notification_type, title, body) = if accepted {
            (
                NotificationType::DoctorRequestAccepted,
                "签约申请已通过",
                format!("{} 医生已成为您家庭的签约医生", request.doctor_name),
            )
        } else {
            (
                NotificationType::DoctorRequestRejected,
                "签约申请未通过",
                format!("{} 医生的签约申请未获通过", request.doctor_name),
            )
        };

        self.notify(
            family_head_id,
            notification_type,
            title,
            body,
            NotificationReference::new(ReferenceKind::DoctorRequest, request.request_id),
        )
        .await
    }

    /// 健康档案事件：通知家庭户主（档案由医生写入）
    async fn handle_record(
        &self,
        record: &MedicalRecordEvent,
        notification_type: NotificationType,
        title: &str,
    ) -> Result<(), ApplicationError> {
        let Some(family_head_id) = self.resolve_family_head(record.family_id).await? else {
            return Ok(());
        };

        self.notify(
            family_head_id,
            notification_type,
            title,
            record.title.clone(),
            NotificationReference::new(ReferenceKind::MedicalRecord, record.record_id),
        )
        .await
    }
}

#[async_trait]
impl EventHandler for NotificationFanout {
    fn name(&self) -> &'static str {
        "notification_fanout"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), ApplicationError> {
        match event {
            DomainEvent::AppointmentCreated { appointment } => {
                self.handle_appointment(
                    appointment,
                    NotificationType::AppointmentCreated,
                    "预约已创建",
                )
                .await
            }
            DomainEvent::AppointmentUpdated { appointment } => {
                self.handle_appointment(
                    appointment,
                    NotificationType::AppointmentUpdated,
                    "预约已更新",
                )
                .await
            }
            DomainEvent::DoctorRequestResolved { request, accepted } => {
                self.handle_doctor_request(request, *accepted).await
            }
            DomainEvent::RecordCreated { record } => {
                self.handle_record(record, NotificationType::RecordCreated, "健康档案已创建")
                    .await
            }
            DomainEvent::RecordUpdated { record } => {
                self.handle_record(record, NotificationType::RecordUpdated, "健康档案已更新")
                    .await
            }
            DomainEvent::MessageSent {
                message,
                doctor_id,
                family_head_id,
            } => {
                // 消息事件：接收者是会话中不是发送者的那一方
                let recipient_id = if message.sender_id == *doctor_id {
                    *family_head_id
                } else {
                    *doctor_id
                };

                self.notify(
                    recipient_id,
                    NotificationType::NewMessage,
                    "新消息",
                    message.preview(50),
                    NotificationReference::new(ReferenceKind::Message, message.id),
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::memory::{InMemoryNotificationRepository, InMemoryUserRepository};
    use chrono::Utc;
    use domain::{Message, Pagination, User, UserRole};

    fn make_fanout() -> (
        NotificationFanout,
        Arc<InMemoryUserRepository>,
        Arc<InMemoryNotificationRepository>,
        Arc<NotificationHub>,
    ) {
        let user_repository = Arc::new(InMemoryUserRepository::new());
        let notification_repository = Arc::new(InMemoryNotificationRepository::new());
        let notification_hub = Arc::new(NotificationHub::new(64));
        let fanout = NotificationFanout::new(
            user_repository.clone(),
            notification_repository.clone(),
            notification_hub.clone(),
            Arc::new(SystemClock),
        );
        (fanout, user_repository, notification_repository, notification_hub)
    }

    async fn seed_family_head(repository: &InMemoryUserRepository, family_id: Uuid) -> Uuid {
        let head = User::new(
            "李先生",
            "li@example.com",
            UserRole::FamilyHead,
            Some(family_id),
            Utc::now(),
        )
        .unwrap();
        repository.create(&head).await.unwrap();
        head.id
    }

    #[tokio::test]
    async fn test_message_event_notifies_non_sender() {
        let (fanout, _, notification_repository, _) = make_fanout();
        let doctor_id = Uuid::new_v4();
        let family_head_id = Uuid::new_v4();

        let message = Message::new(
            Uuid::new_v4(),
            doctor_id,
            "请按时复诊",
            vec![],
            Utc::now(),
        )
        .unwrap();
        let event = DomainEvent::message_sent(message.clone(), doctor_id, family_head_id);

        fanout.handle(&event).await.unwrap();

        // 通知落在接收方（户主），医生不会收到自己消息的通知
        let head_notifications = notification_repository
            .list_by_user(family_head_id, Pagination::default_page(), true)
            .await
            .unwrap();
        assert_eq!(head_notifications.total_count, 1);
        let notification = &head_notifications.items[0];
        assert_eq!(notification.notification_type, NotificationType::NewMessage);
        assert_eq!(notification.reference.id, message.id);

        let doctor_notifications = notification_repository
            .list_by_user(doctor_id, Pagination::default_page(), true)
            .await
            .unwrap();
        assert_eq!(doctor_notifications.total_count, 0);
    }

    #[tokio::test]
    async fn test_appointment_event_notifies_both_sides() {
        let (fanout, user_repository, notification_repository, _) = make_fanout();
        let doctor_id = Uuid::new_v4();
        let family_id = Uuid::new_v4();
        let family_head_id = seed_family_head(&user_repository, family_id).await;

        let event = DomainEvent::appointment_created(AppointmentEvent {
            appointment_id: Uuid::new_v4(),
            doctor_id,
            family_id,
            title: "年度体检".to_string(),
            scheduled_at: Utc::now(),
        });

        fanout.handle(&event).await.unwrap();

        assert_eq!(
            notification_repository.count_unread(doctor_id).await.unwrap(),
            1
        );
        assert_eq!(
            notification_repository
                .count_unread(family_head_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_doctor_request_event_notifies_family_head_only() {
        let (fanout, user_repository, notification_repository, _) = make_fanout();
        let doctor_id = Uuid::new_v4();
        let family_id = Uuid::new_v4();
        let family_head_id = seed_family_head(&user_repository, family_id).await;

        let event = DomainEvent::doctor_request_resolved(
            DoctorRequestEvent {
                request_id: Uuid::new_v4(),
                doctor_id,
                doctor_name: "王医生".to_string(),
                family_id,
            },
            true,
        );

        fanout.handle(&event).await.unwrap();

        let notifications = notification_repository
            .list_by_user(family_head_id, Pagination::default_page(), true)
            .await
            .unwrap();
        assert_eq!(notifications.total_count, 1);
        assert_eq!(
            notifications.items[0].notification_type,
            NotificationType::DoctorRequestAccepted
        );
        assert_eq!(
            notification_repository.count_unread(doctor_id).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_missing_family_head_is_skipped() {
        let (fanout, _, notification_repository, _) = make_fanout();

        let event = DomainEvent::record_created(MedicalRecordEvent {
            record_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            title: "血常规".to_string(),
        });

        // 家庭没有户主：不报错，也不产生通知
        fanout.handle(&event).await.unwrap();
        let notifications = notification_repository
            .list_by_user(Uuid::new_v4(), Pagination::default_page(), true)
            .await
            .unwrap();
        assert_eq!(notifications.total_count, 0);
    }

    #[tokio::test]
    async fn test_notification_is_published_to_hub() {
        let (fanout, user_repository, _, notification_hub) = make_fanout();
        let family_id = Uuid::new_v4();
        let family_head_id = seed_family_head(&user_repository, family_id).await;

        let mut stream = notification_hub.subscribe(family_head_id);

        let event = DomainEvent::record_updated(MedicalRecordEvent {
            record_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            family_id,
            title: "随访记录".to_string(),
        });
        fanout.handle(&event).await.unwrap();

        let notification = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            stream.recv(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(notification.notification_type, NotificationType::RecordUpdated);
    }
}
