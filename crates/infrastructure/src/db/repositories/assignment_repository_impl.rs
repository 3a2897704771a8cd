//! 签约Repository实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::{AssignmentRepository, AssignmentStatus, DoctorAssignment, DomainResult};

use crate::db::repositories::map_sqlx_err;
use crate::db::DbPool;

/// 数据库签约模型
#[derive(Debug, Clone, FromRow)]
struct DbAssignment {
    id: Uuid,
    doctor_id: Uuid,
    family_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbAssignment> for DoctorAssignment {
    type Error = domain::DomainError;

    fn try_from(record: DbAssignment) -> Result<Self, Self::Error> {
        Ok(DoctorAssignment::with_id(
            record.id,
            record.doctor_id,
            record.family_id,
            AssignmentStatus::parse(&record.status)?,
            record.created_at,
            record.resolved_at,
        ))
    }
}

pub struct PostgresAssignmentRepository {
    pool: DbPool,
}

impl PostgresAssignmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentRepository for PostgresAssignmentRepository {
    async fn create(&self, assignment: &DoctorAssignment) -> DomainResult<DoctorAssignment> {
        sqlx::query(
            r#"
            INSERT INTO doctor_assignments
                (id, doctor_id, family_id, status, created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
                SET status = EXCLUDED.status, resolved_at = EXCLUDED.resolved_at
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.doctor_id)
        .bind(assignment.family_id)
        .bind(assignment.status.as_str())
        .bind(assignment.created_at)
        .bind(assignment.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(assignment.clone())
    }

    async fn find_by_pair(
        &self,
        doctor_id: Uuid,
        family_id: Uuid,
    ) -> DomainResult<Option<DoctorAssignment>> {
        let record = sqlx::query_as::<_, DbAssignment>(
            r#"
            SELECT id, doctor_id, family_id, status, created_at, resolved_at
            FROM doctor_assignments
            WHERE doctor_id = $1 AND family_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(doctor_id)
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(DoctorAssignment::try_from).transpose()
    }

    async fn has_active(&self, doctor_id: Uuid, family_id: Uuid) -> DomainResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM doctor_assignments
                WHERE doctor_id = $1 AND family_id = $2 AND status = 'active'
            )
            "#,
        )
        .bind(doctor_id)
        .bind(family_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(exists)
    }
}
