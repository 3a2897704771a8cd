//! 医生签约记录定义
//!
//! 签约记录授权某位医生为某个家庭提供服务并与其通信。
//! 只有处于 Active 状态的记录才构成有效的医生-家庭关系。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 签约状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    /// 待处理
    Pending,
    /// 已生效
    Active,
    /// 已拒绝
    Rejected,
    /// 已解除
    Revoked,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Active => "active",
            AssignmentStatus::Rejected => "rejected",
            AssignmentStatus::Revoked => "revoked",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "pending" => Ok(AssignmentStatus::Pending),
            "active" => Ok(AssignmentStatus::Active),
            "rejected" => Ok(AssignmentStatus::Rejected),
            "revoked" => Ok(AssignmentStatus::Revoked),
            other => Err(DomainError::validation_error(
                "status",
                format!("未知的签约状态: {other}"),
            )),
        }
    }
}

/// 医生签约记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorAssignment {
    /// 记录ID
    pub id: Uuid,
    /// 医生ID
    pub doctor_id: Uuid,
    /// 家庭ID
    pub family_id: Uuid,
    /// 状态
    pub status: AssignmentStatus,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 处理时间
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DoctorAssignment {
    /// 创建新的签约申请
    pub fn new(doctor_id: Uuid, family_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            family_id,
            status: AssignmentStatus::Pending,
            created_at: now,
            resolved_at: None,
        }
    }

    /// 创建具有指定ID的记录（用于从数据库加载）
    pub fn with_id(
        id: Uuid,
        doctor_id: Uuid,
        family_id: Uuid,
        status: AssignmentStatus,
        created_at: DateTime<Utc>,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            doctor_id,
            family_id,
            status,
            created_at,
            resolved_at,
        }
    }

    /// 处理签约申请
    pub fn resolve(&mut self, accepted: bool, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != AssignmentStatus::Pending {
            return Err(DomainError::business_rule_violation(
                "只有待处理的签约申请可以被处理",
            ));
        }

        self.status = if accepted {
            AssignmentStatus::Active
        } else {
            AssignmentStatus::Rejected
        };
        self.resolved_at = Some(now);
        Ok(())
    }

    /// 是否为有效签约
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}
