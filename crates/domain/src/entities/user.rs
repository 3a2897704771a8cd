//! 用户实体定义
//!
//! 平台上有两类身份：医生和家庭成员。每个家庭有且仅有一位户主
//! （head of household），户主代表家庭与医生进行会话。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 用户角色枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    /// 医生
    Doctor,
    /// 家庭户主
    FamilyHead,
    /// 家庭普通成员
    FamilyMember,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Doctor => "doctor",
            UserRole::FamilyHead => "family_head",
            UserRole::FamilyMember => "family_member",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "doctor" => Ok(UserRole::Doctor),
            "family_head" => Ok(UserRole::FamilyHead),
            "family_member" => Ok(UserRole::FamilyMember),
            other => Err(DomainError::validation_error(
                "role",
                format!("未知的用户角色: {other}"),
            )),
        }
    }
}

/// 用户实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// 用户唯一ID
    pub id: Uuid,
    /// 显示名称
    pub display_name: String,
    /// 邮箱
    pub email: String,
    /// 角色
    pub role: UserRole,
    /// 所属家庭ID（医生为None）
    pub family_id: Option<Uuid>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl User {
    /// 创建新用户
    pub fn new(
        display_name: impl Into<String>,
        email: impl Into<String>,
        role: UserRole,
        family_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let display_name = display_name.into().trim().to_owned();
        let email = email.into().trim().to_owned();

        if display_name.is_empty() {
            return Err(DomainError::validation_error(
                "display_name",
                "显示名称不能为空",
            ));
        }

        if !email.contains('@') {
            return Err(DomainError::validation_error("email", "邮箱格式不正确"));
        }

        // 家庭成员必须归属某个家庭，医生不归属家庭
        match role {
            UserRole::Doctor => {
                if family_id.is_some() {
                    return Err(DomainError::validation_error(
                        "family_id",
                        "医生不能归属家庭",
                    ));
                }
            }
            UserRole::FamilyHead | UserRole::FamilyMember => {
                if family_id.is_none() {
                    return Err(DomainError::validation_error(
                        "family_id",
                        "家庭成员必须归属一个家庭",
                    ));
                }
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            display_name,
            email,
            role,
            family_id,
            created_at: now,
        })
    }

    /// 创建具有指定ID的用户（用于从数据库加载）
    pub fn with_id(
        id: Uuid,
        display_name: String,
        email: String,
        role: UserRole,
        family_id: Option<Uuid>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            display_name,
            email,
            role,
            family_id,
            created_at,
        }
    }

    /// 是否为医生
    pub fn is_doctor(&self) -> bool {
        self.role == UserRole::Doctor
    }

    /// 是否为家庭户主
    pub fn is_family_head(&self) -> bool {
        self.role == UserRole::FamilyHead
    }
}
