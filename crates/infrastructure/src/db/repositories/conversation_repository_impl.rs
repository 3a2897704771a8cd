//! 会话Repository实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::{
    Conversation, ConversationRepository, DomainError, DomainResult, PaginatedResult, Pagination,
};

use crate::db::repositories::map_sqlx_err;
use crate::db::DbPool;

/// 数据库会话模型
#[derive(Debug, Clone, FromRow)]
struct DbConversation {
    id: Uuid,
    doctor_id: Uuid,
    family_id: Uuid,
    family_head_id: Uuid,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl From<DbConversation> for Conversation {
    fn from(record: DbConversation) -> Self {
        Conversation {
            id: record.id,
            doctor_id: record.doctor_id,
            family_id: record.family_id,
            family_head_id: record.family_head_id,
            created_at: record.created_at,
            last_activity_at: record.last_activity_at,
        }
    }
}

const SELECT_COLUMNS: &str =
    "id, doctor_id, family_id, family_head_id, created_at, last_activity_at";

pub struct PostgresConversationRepository {
    pool: DbPool,
}

impl PostgresConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PostgresConversationRepository {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Conversation>> {
        let record = sqlx::query_as::<_, DbConversation>(&format!(
            "SELECT {SELECT_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Conversation::from))
    }

    async fn find_by_pair(
        &self,
        doctor_id: Uuid,
        family_head_id: Uuid,
    ) -> DomainResult<Option<Conversation>> {
        let record = sqlx::query_as::<_, DbConversation>(&format!(
            "SELECT {SELECT_COLUMNS} FROM conversations WHERE doctor_id = $1 AND family_head_id = $2"
        ))
        .bind(doctor_id)
        .bind(family_head_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Conversation::from))
    }

    async fn get_or_create(&self, conversation: Conversation) -> DomainResult<Conversation> {
        // (doctor_id, family_head_id) 上的唯一约束保证并发创建不会重复：
        // 冲突方插入为no-op，随后的查询读到先到者的行
        sqlx::query(
            r#"
            INSERT INTO conversations
                (id, doctor_id, family_id, family_head_id, created_at, last_activity_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (doctor_id, family_head_id) DO NOTHING
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.doctor_id)
        .bind(conversation.family_id)
        .bind(conversation.family_head_id)
        .bind(conversation.created_at)
        .bind(conversation.last_activity_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        self.find_by_pair(conversation.doctor_id, conversation.family_head_id)
            .await?
            .ok_or_else(|| DomainError::storage("会话在创建后立即不可见"))
    }

    async fn list_by_participant(
        &self,
        user_id: Uuid,
        pagination: Pagination,
    ) -> DomainResult<PaginatedResult<Conversation>> {
        let total_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM conversations WHERE doctor_id = $1 OR family_head_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let records = sqlx::query_as::<_, DbConversation>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM conversations
            WHERE doctor_id = $1 OR family_head_id = $1
            ORDER BY last_activity_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let items = records.into_iter().map(Conversation::from).collect();
        Ok(PaginatedResult::new(items, total_count as u64, pagination))
    }

    async fn list_ids_by_participant(&self, user_id: Uuid) -> DomainResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM conversations WHERE doctor_id = $1 OR family_head_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(ids)
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query("UPDATE conversations SET last_activity_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::resource_not_found("会话", id));
        }
        Ok(())
    }
}
