//! 通知Repository实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::{
    DomainResult, Notification, NotificationReference, NotificationRepository, NotificationType,
    PaginatedResult, Pagination, ReferenceKind,
};

use crate::db::repositories::map_sqlx_err;
use crate::db::DbPool;

/// 数据库通知模型
#[derive(Debug, Clone, FromRow)]
struct DbNotification {
    id: Uuid,
    user_id: Uuid,
    notification_type: String,
    title: String,
    body: String,
    reference_kind: String,
    reference_id: Uuid,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbNotification> for Notification {
    type Error = domain::DomainError;

    fn try_from(record: DbNotification) -> Result<Self, Self::Error> {
        Ok(Notification::with_id(
            record.id,
            record.user_id,
            NotificationType::parse(&record.notification_type)?,
            record.title,
            record.body,
            NotificationReference::new(
                ReferenceKind::parse(&record.reference_kind)?,
                record.reference_id,
            ),
            record.is_read,
            record.read_at,
            record.created_at,
        ))
    }
}

const SELECT_COLUMNS: &str = "id, user_id, notification_type, title, body, \
                              reference_kind, reference_id, is_read, read_at, created_at";

pub struct PostgresNotificationRepository {
    pool: DbPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn create(&self, notification: &Notification) -> DomainResult<Notification> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, notification_type, title, body,
                 reference_kind, reference_id, is_read, read_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.notification_type.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.reference.kind.as_str())
        .bind(notification.reference.id)
        .bind(notification.is_read)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(notification.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Notification>> {
        let record = sqlx::query_as::<_, DbNotification>(&format!(
            "SELECT {SELECT_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Notification::try_from).transpose()
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        pagination: Pagination,
        include_read: bool,
    ) -> DomainResult<PaginatedResult<Notification>> {
        let total_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND ($2 OR is_read = FALSE)",
        )
        .bind(user_id)
        .bind(include_read)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let records = sqlx::query_as::<_, DbNotification>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM notifications
            WHERE user_id = $1 AND ($2 OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(include_read)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let items = records
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PaginatedResult::new(items, total_count as u64, pagination))
    }

    async fn count_unread(&self, user_id: Uuid) -> DomainResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(count as u64)
    }

    async fn mark_as_read(&self, notification_id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = $2 WHERE id = $1 AND is_read = FALSE",
        )
        .bind(notification_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn mark_all_as_read(&self, user_id: Uuid, at: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = $2 WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}
