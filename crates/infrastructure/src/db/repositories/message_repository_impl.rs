//! 消息Repository实现

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::{
    DomainResult, Message, MessageAttachment, MessageRepository, MessageSearchParams,
    PaginatedResult, Pagination,
};

use crate::db::repositories::map_sqlx_err;
use crate::db::DbPool;

/// 数据库消息模型
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl DbMessage {
    fn into_message(self, attachments: Vec<MessageAttachment>) -> Message {
        Message::with_id(
            self.id,
            self.conversation_id,
            self.sender_id,
            self.content,
            attachments,
            self.is_read,
            self.read_at,
            self.created_at,
        )
    }
}

/// 数据库附件模型
#[derive(Debug, Clone, FromRow)]
struct DbAttachment {
    id: Uuid,
    message_id: Uuid,
    file_name: String,
    url: String,
    mime_type: String,
    size: i64,
}

impl From<DbAttachment> for MessageAttachment {
    fn from(record: DbAttachment) -> Self {
        MessageAttachment {
            id: record.id,
            file_name: record.file_name,
            url: record.url,
            mime_type: record.mime_type,
            size: record.size.max(0) as u64,
        }
    }
}

const SELECT_COLUMNS: &str =
    "id, conversation_id, sender_id, content, is_read, read_at, created_at";

pub struct PostgresMessageRepository {
    pool: DbPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// 批量加载消息附件，按消息ID归组
    async fn load_attachments(
        &self,
        message_ids: &[Uuid],
    ) -> DomainResult<HashMap<Uuid, Vec<MessageAttachment>>> {
        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let records = sqlx::query_as::<_, DbAttachment>(
            r#"
            SELECT id, message_id, file_name, url, mime_type, size
            FROM message_attachments
            WHERE message_id = ANY($1)
            ORDER BY file_name
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut grouped: HashMap<Uuid, Vec<MessageAttachment>> = HashMap::new();
        for record in records {
            grouped
                .entry(record.message_id)
                .or_default()
                .push(record.into());
        }
        Ok(grouped)
    }

    /// 把消息行和附件拼装成领域实体
    async fn assemble(&self, records: Vec<DbMessage>) -> DomainResult<Vec<Message>> {
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let mut attachments = self.load_attachments(&ids).await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let list = attachments.remove(&record.id).unwrap_or_default();
                record.into_message(list)
            })
            .collect())
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn create(&self, message: &Message) -> DomainResult<Message> {
        sqlx::query(
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_id, content, is_read, read_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.is_read)
        .bind(message.read_at)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut stored = message.clone();
        stored.attachments = Vec::new();
        Ok(stored)
    }

    async fn add_attachments(
        &self,
        message_id: Uuid,
        attachments: &[MessageAttachment],
    ) -> DomainResult<()> {
        // 同一事务内写入全部附件，任一失败则整体回滚
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        for attachment in attachments {
            sqlx::query(
                r#"
                INSERT INTO message_attachments (id, message_id, file_name, url, mime_type, size)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(attachment.id)
            .bind(message_id)
            .bind(&attachment.file_name)
            .bind(&attachment.url)
            .bind(&attachment.mime_type)
            .bind(attachment.size as i64)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn delete(&self, message_id: Uuid) -> DomainResult<()> {
        // 附件行随消息级联删除
        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Message>> {
        let record = sqlx::query_as::<_, DbMessage>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => Ok(self.assemble(vec![record]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn mark_as_read(&self, message_id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        // 幂等：已读消息不再更新read_at
        sqlx::query(
            "UPDATE messages SET is_read = TRUE, read_at = $2 WHERE id = $1 AND is_read = FALSE",
        )
        .bind(message_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn mark_conversation_as_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = $3
            WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }

    async fn list_by_conversation(
        &self,
        conversation_id: Uuid,
        pagination: Pagination,
    ) -> DomainResult<PaginatedResult<Message>> {
        let total_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        let records = sqlx::query_as::<_, DbMessage>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(conversation_id)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let items = self.assemble(records).await?;
        Ok(PaginatedResult::new(items, total_count as u64, pagination))
    }

    async fn search(
        &self,
        params: &MessageSearchParams,
        pagination: Pagination,
    ) -> DomainResult<PaginatedResult<Message>> {
        // 授权会话集合在查询内过滤，分页因此作用于已过滤的结果集
        const FILTER: &str = r#"
            conversation_id = ANY($1)
            AND ($2::uuid IS NULL OR conversation_id = $2)
            AND ($3::text IS NULL OR content ILIKE '%' || $3 || '%')
            AND ($4::timestamptz IS NULL OR created_at >= $4)
            AND ($5::timestamptz IS NULL OR created_at <= $5)
        "#;

        let total_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM messages WHERE {FILTER}"
        ))
        .bind(&params.conversation_ids)
        .bind(params.conversation_id)
        .bind(params.keyword.as_deref())
        .bind(params.created_after)
        .bind(params.created_before)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let records = sqlx::query_as::<_, DbMessage>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM messages
            WHERE {FILTER}
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#
        ))
        .bind(&params.conversation_ids)
        .bind(params.conversation_id)
        .bind(params.keyword.as_deref())
        .bind(params.created_after)
        .bind(params.created_before)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let items = self.assemble(records).await?;
        Ok(PaginatedResult::new(items, total_count as u64, pagination))
    }

    async fn count_unread(&self, conversation_id: Uuid, reader_id: Uuid) -> DomainResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(count as u64)
    }
}
