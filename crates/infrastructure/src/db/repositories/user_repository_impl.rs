//! 用户Repository实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::{DomainResult, User, UserRepository, UserRole};

use crate::db::repositories::map_sqlx_err;
use crate::db::DbPool;

/// 数据库用户模型
#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    display_name: String,
    email: String,
    role: String,
    family_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = domain::DomainError;

    fn try_from(record: DbUser) -> Result<Self, Self::Error> {
        Ok(User::with_id(
            record.id,
            record.display_name,
            record.email,
            UserRole::parse(&record.role)?,
            record.family_id,
            record.created_at,
        ))
    }
}

pub struct PostgresUserRepository {
    pool: DbPool,
}

impl PostgresUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: &User) -> DomainResult<User> {
        sqlx::query(
            r#"
            INSERT INTO users (id, display_name, email, role, family_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.family_id)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(user.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>> {
        let record = sqlx::query_as::<_, DbUser>(
            "SELECT id, display_name, email, role, family_id, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_family_head(&self, family_id: Uuid) -> DomainResult<Option<User>> {
        let record = sqlx::query_as::<_, DbUser>(
            r#"
            SELECT id, display_name, email, role, family_id, created_at
            FROM users
            WHERE family_id = $1 AND role = 'family_head'
            "#,
        )
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn exists(&self, id: Uuid) -> DomainResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(exists)
    }
}
